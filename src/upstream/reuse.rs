//! Serial reuse pool: at most one query in flight per connection, and
//! connections are handed out most-recently-used first so a cold
//! connection at the bottom of the stack ages out and gets reaped rather
//! than kept alive by round-robin reuse.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::cancel::Cancel;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

use super::conn::{ConnState, DnsConn, ReservedExchanger};

/// Per-exchange deadline: a reused connection that doesn't answer within
/// this window is assumed wedged and dropped rather than returned to the
/// stack.
const EXCHANGE_DEADLINE: Duration = Duration::from_secs(6);

/// Dial function for a single-use-at-a-time connection.
pub type Dialer =
    Arc<dyn Fn() -> futures::future::BoxFuture<'static, Result<Box<dyn DnsConn>>> + Send + Sync>;

/// A pool of connections reused one exchange at a time, most recently
/// used first.
pub struct ReusePool {
    dialer: Dialer,
    max_idle: usize,
    stack: Mutex<Vec<Box<dyn DnsConn>>>,
}

impl ReusePool {
    pub fn new(dialer: Dialer, max_idle: usize) -> Self {
        Self {
            dialer,
            max_idle: max_idle.max(1),
            stack: Mutex::new(Vec::new()),
        }
    }

    async fn checkout(&self) -> Result<Box<dyn DnsConn>> {
        let mut stack = self.stack.lock().await;
        while let Some(conn) = stack.pop() {
            if !conn.is_closed() {
                return Ok(conn);
            }
        }
        drop(stack);
        (self.dialer)().await
    }

    async fn checkin(&self, conn: Box<dyn DnsConn>) {
        if conn.is_closed() {
            return;
        }
        let mut stack = self.stack.lock().await;
        if stack.len() >= self.max_idle {
            stack.remove(0);
        }
        stack.push(conn);
    }

    /// Checks out a connection, runs one exchange under a 6s deadline,
    /// and returns the connection to the top of the stack on success.
    /// On timeout or error the connection is dropped (not returned).
    pub async fn exchange(&self, query: &DnsPacket, cancel: &Cancel) -> Result<DnsPacket> {
        let conn = self.checkout().await?;
        if conn.state() != ConnState::Open {
            return Err(ForwarderError::TransportClosed);
        }

        let reservation = conn.reserve().await?;
        let result = timeout(EXCHANGE_DEADLINE, reservation.exchange(query, cancel)).await;

        match result {
            Ok(Ok(response)) => {
                self.checkin(conn).await;
                Ok(response)
            }
            Ok(Err(ForwarderError::Cancelled)) => {
                // Withdrawn, not a transport failure: the connection is
                // still good and goes back to the idle stack.
                self.checkin(conn).await;
                Err(ForwarderError::Cancelled)
            }
            Ok(Err(err)) => {
                conn.close();
                Err(err)
            }
            Err(_) => {
                conn.close();
                Err(ForwarderError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_matches_spec_value() {
        assert_eq!(EXCHANGE_DEADLINE, Duration::from_secs(6));
    }
}
