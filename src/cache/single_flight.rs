use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::cache::fingerprint::Fingerprint;
use crate::dns::DnsPacket;
use crate::error::{ForwarderError, Result};

struct InFlight {
    sender: broadcast::Sender<Result<DnsPacket>>,
    waiting_count: AtomicU32,
}

/// Collapses concurrent lookups for the same fingerprint into one
/// upstream fetch: the first caller resolves and broadcasts the result to
/// everyone who joined in the meantime.
#[derive(Default)]
pub struct SingleFlight {
    in_flight: DashMap<Fingerprint, InFlight>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Runs `fetch` on behalf of the first caller for `key`; later callers
    /// for the same key subscribe to its broadcast instead of re-running
    /// `fetch`. Errors are broadcast too, so a failed resolve fails every
    /// waiter once rather than retrying per-waiter.
    pub async fn run<F, Fut>(&self, key: Fingerprint, fetch: F) -> Result<DnsPacket>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<DnsPacket>>,
    {
        use dashmap::mapref::entry::Entry;

        // The entry API holds the shard lock across the occupied/vacant
        // check, so only one caller ever becomes the leader for `key`.
        let mut joined = None;
        let mut leader_sender = None;

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occ) => {
                let in_flight = occ.get();
                in_flight.waiting_count.fetch_add(1, Ordering::Relaxed);
                joined = Some(in_flight.sender.subscribe());
            }
            Entry::Vacant(vac) => {
                let (sender, _receiver) = broadcast::channel(16);
                vac.insert(InFlight {
                    sender: sender.clone(),
                    waiting_count: AtomicU32::new(1),
                });
                leader_sender = Some(sender);
            }
        }

        if let Some(mut receiver) = joined {
            return match receiver.recv().await {
                Ok(result) => result,
                Err(_) => Err(ForwarderError::TransportClosed),
            };
        }

        let sender = leader_sender.expect("leader path always sets a sender");
        let result = fetch().await;
        self.in_flight.remove(&key);
        let _ = sender.send(result.clone());
        result
    }
}

pub(crate) type SharedSingleFlight = Arc<SingleFlight>;
