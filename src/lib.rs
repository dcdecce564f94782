//! Programmable DNS forwarder core: a query-processing pipeline, an
//! upstream connection layer, a response cache, a domain matcher, and
//! server front-ends for UDP/TCP/DoT/DoH/DoQ.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod context;
pub mod dns;
pub mod error;
pub mod graceful_shutdown;
pub mod matcher;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod upstream;

pub use cancel::Cancel;
pub use context::QueryContext;
pub use error::{ForwarderError, Result};
