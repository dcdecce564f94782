//! Connection-state contract shared by every upstream transport.
//!
//! Mirrors the lifecycle the teacher's connection manager tracks for
//! pooled connections (`Dialing` while the handshake is in flight, `Open`
//! once usable, `Closed` once retired), but exposes it as a trait so the
//! pipelined pool, the serial reuse pool, and individual transports can
//! each implement it over their own I/O primitives.

use std::time::Instant;

use async_trait::async_trait;

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::Result;

/// Lifecycle state of a pooled upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Dialing,
    Open,
    Closed,
}

/// A single query exchange reserved on a connection: a permit to send one
/// query and await its matching response. Transports that multiplex many
/// in-flight queries over one socket (pipelined TCP/DoT/DoQ) hand these
/// out concurrently; transports that don't (the serial reuse pool) hand
/// out at most one at a time.
#[async_trait]
pub trait ReservedExchanger: Send {
    /// Sends `query` and awaits the matching reply. If `cancel` fires
    /// first, the reservation's slot is withdrawn (freed without being
    /// answered) and `ForwarderError::Cancelled` is returned; the
    /// underlying connection is left open for other in-flight queries.
    async fn exchange(self: Box<Self>, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket>;
}

/// A pooled upstream connection: dial once, reserve many times.
#[async_trait]
pub trait DnsConn: Send + Sync {
    fn state(&self) -> ConnState;

    fn is_closed(&self) -> bool {
        self.state() == ConnState::Closed
    }

    /// Wall-clock instant of the connection's last successful exchange,
    /// used by idle-reaping and busy-threshold heuristics.
    fn last_activity(&self) -> Instant;

    /// How many queries this connection has carried over its lifetime.
    fn queries_served(&self) -> u64;

    /// How many reservations are outstanding right now (sent, awaiting a
    /// response). Used by the pool to pick the least-busy connection.
    fn in_flight(&self) -> usize;

    /// Reserves a slot to send one query, or an error if the connection
    /// has no capacity (`TransportCapacity`) or is closed
    /// (`TransportClosed`).
    async fn reserve(&self) -> Result<Box<dyn ReservedExchanger>>;

    /// Marks the connection closed; in-flight reservations still resolve
    /// as best-effort, new reservations fail immediately.
    fn close(&self);
}
