//! Closed error taxonomy for the forwarder core.
//!
//! Every fallible path in the crate returns `ForwarderError` (or a more
//! specific type that converts into it at the boundary). Variants map
//! directly onto the propagation policy: transport errors close the
//! connection, cache errors are swallowed and logged, config errors are
//! fatal at startup.

use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForwarderError>;

#[derive(Debug, Clone, Error)]
pub enum ForwarderError {
    #[error("failed to establish upstream connection: {0}")]
    TransportDial(String),

    #[error("upstream transport I/O error: {0}")]
    TransportIo(String),

    #[error("operation attempted on a closed transport")]
    TransportClosed,

    #[error("no reservation slot available on upstream connection")]
    TransportCapacity,

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("message exceeds wire size limit ({0} bytes)")]
    PayloadOverflow(usize),

    #[error("could not decode DNS message: {0}")]
    MalformedMessage(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("cache backend error: {0}")]
    CacheBackend(String),

    #[error("no upstream available to satisfy query")]
    NoUpstreamAvailable,

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for ForwarderError {
    fn from(err: std::io::Error) -> Self {
        ForwarderError::Io(Arc::new(err))
    }
}

impl From<tokio::time::error::Elapsed> for ForwarderError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ForwarderError::Timeout
    }
}

impl ForwarderError {
    /// True if this error should close the owning transport connection,
    /// per the propagation policy (cancellation/timeout only withdraw).
    pub fn closes_transport(&self) -> bool {
        !matches!(self, ForwarderError::Cancelled | ForwarderError::Timeout)
    }
}
