//! Response cache: a sharded in-memory LRU with TTL-aware storage,
//! single-flight lazy refresh, and an optional compressed Redis backend.

pub mod compression;
pub mod entry;
pub mod fingerprint;
pub mod lru;
pub mod redis_backend;
pub mod single_flight;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::dns::{DnsPacket, Rcode};
use crate::error::Result;

pub use entry::CacheEntry;
pub use fingerprint::Fingerprint;
pub use redis_backend::RedisBackend;
pub use single_flight::SingleFlight;

const MIN_SHARD_CAPACITY: usize = 16;
const EMPTY_NOERROR_TTL: u64 = 300;
const NXDOMAIN_TTL: u64 = 30;
const SERVFAIL_TTL: u64 = 5;
const LAZY_SYNTHETIC_TTL: u64 = 5;
const LAZY_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// True iff `request` is eligible for caching at all: a standard query,
/// not a response, exactly one question of class IN, and (unless
/// `cache_everything` is set) no extra records beyond an OPT.
pub fn is_cacheable_request(request: &DnsPacket, cache_everything: bool) -> bool {
    if request.header.qr || request.header.opcode != 0 {
        return false;
    }
    if request.questions.len() != 1 {
        return false;
    }
    if request.questions[0].qclass != crate::dns::DnsResourceClass::IN {
        return false;
    }
    if cache_everything {
        return true;
    }
    let non_opt_extra = request
        .resources
        .iter()
        .filter(|r| r.rtype != crate::dns::DnsResourceType::OPT)
        .count();
    request.authorities.is_empty() && non_opt_extra == 0
}

/// TTL (seconds) to store `response` for, or `None` if it must not be
/// cached (e.g. truncated).
pub fn storage_ttl(response: &DnsPacket, lazy_cache_ttl: Option<u64>) -> Option<u64> {
    if response.header.tc {
        return None;
    }
    match response.header.rcode {
        Rcode::NOERROR if !response.answers.is_empty() => {
            let msg_ttl = response.min_answer_ttl().unwrap_or(0) as u64;
            Some(lazy_cache_ttl.unwrap_or(msg_ttl))
        }
        Rcode::NOERROR => {
            let min_ttl = response.min_answer_ttl().unwrap_or(EMPTY_NOERROR_TTL as u32) as u64;
            Some(min_ttl.min(EMPTY_NOERROR_TTL))
        }
        Rcode::NXDOMAIN => Some(NXDOMAIN_TTL),
        Rcode::SERVFAIL => Some(SERVFAIL_TTL),
        _ => None,
    }
}

/// Outcome of a `lookup`: either a response ready to serve verbatim, or a
/// stale-but-hard-valid ("lazy") hit that should be served immediately
/// while a refresh runs in the background.
pub enum Lookup {
    Fresh(DnsPacket),
    Lazy(DnsPacket),
}

struct Shard {
    lru: Mutex<lru::LruShard<Fingerprint, CacheEntry>>,
}

/// Sharded in-memory LRU, optionally backed by Redis for cross-process
/// sharing. Shard selection hashes the fingerprint; each shard guards its
/// own lock so concurrent lookups for different keys don't contend.
pub struct Cache {
    shards: Vec<Shard>,
    redis: Option<RedisBackend>,
    single_flight: SingleFlight,
    compress: bool,
    lazy_enabled: bool,
}

impl Cache {
    pub fn new(total_capacity: usize, shard_count: usize, redis: Option<RedisBackend>) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = (total_capacity / shard_count).max(MIN_SHARD_CAPACITY);
        let shards = (0..shard_count)
            .map(|_| Shard {
                lru: Mutex::new(lru::LruShard::new(per_shard)),
            })
            .collect();
        Self {
            shards,
            redis,
            single_flight: SingleFlight::new(),
            compress: false,
            lazy_enabled: true,
        }
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn with_lazy_refresh(mut self, enabled: bool) -> Self {
        self.lazy_enabled = enabled;
        self
    }

    fn shard_for(&self, fp: &Fingerprint) -> &Shard {
        let idx = (fp.shard_hash() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Looks up `fp`, aging TTLs by elapsed time. A hit whose message TTL
    /// has elapsed but whose hard expiration has not is returned as a
    /// `Lazy` hit with a short synthetic TTL.
    pub async fn lookup(&self, fp: &Fingerprint, now: u64) -> Option<Lookup> {
        if let Some(entry) = self.local_get(fp) {
            return self.to_lookup(entry, now);
        }
        if let Some(redis) = &self.redis {
            let raw_entry = redis.get(fp).await?;
            let entry = self.maybe_decompress(raw_entry)?;
            self.local_put(fp.clone(), entry.clone());
            return self.to_lookup(entry, now);
        }
        None
    }

    fn to_lookup(&self, entry: CacheEntry, now: u64) -> Option<Lookup> {
        if entry.is_hard_expired(now) {
            return None;
        }
        let mut response = DnsPacket::from_wire(&entry.payload).ok()?;
        let elapsed = entry.elapsed(now) as u32;
        let msg_ttl = response.min_answer_ttl().unwrap_or(0);

        response.age_ttls(elapsed);

        if self.lazy_enabled && (elapsed as u64) > msg_ttl as u64 {
            for answer in response.answers.iter_mut() {
                answer.ttl = LAZY_SYNTHETIC_TTL as u32;
            }
            Some(Lookup::Lazy(response))
        } else {
            Some(Lookup::Fresh(response))
        }
    }

    fn maybe_decompress(&self, mut entry: CacheEntry) -> Option<CacheEntry> {
        if self.compress {
            entry.payload = compression::decompress(&entry.payload).ok()?;
        }
        Some(entry)
    }

    fn local_get(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        self.shard_for(fp).lru.lock().get(fp).cloned()
    }

    fn local_put(&self, fp: Fingerprint, entry: CacheEntry) {
        self.shard_for(&fp).lru.lock().put(fp, entry);
    }

    /// Stores `response` under `fp` per the storage policy, to both the
    /// local shard and (if configured) Redis.
    pub async fn store(&self, fp: &Fingerprint, response: &DnsPacket, now: u64, lazy_cache_ttl: Option<u64>) -> Result<()> {
        let Some(ttl) = storage_ttl(response, lazy_cache_ttl) else {
            return Ok(());
        };
        let payload = response.to_wire().map_err(|e| {
            crate::error::ForwarderError::MalformedMessage(e.to_string())
        })?;
        let entry = CacheEntry::new(now, ttl, payload);
        self.local_put(fp.clone(), entry.clone());

        if let Some(redis) = &self.redis {
            let redis_entry = if self.compress {
                let compressed = compression::compress(&entry.payload)?;
                CacheEntry {
                    payload: compressed,
                    ..entry.clone()
                }
            } else {
                entry.clone()
            };
            redis.set(fp, &redis_entry, ttl).await;
        }
        Ok(())
    }

    /// Spawns a background task that periodically scans every shard and
    /// evicts entries whose hard expiration has already passed, so cold
    /// keys don't linger until an LRU push finally evicts them.
    pub fn spawn_cleaner(self: &Arc<Self>, interval: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let mut removed = 0usize;
                for shard in &cache.shards {
                    let evicted = shard.lru.lock().retain(|_, entry| !entry.is_hard_expired(now));
                    removed += evicted.len();
                }
                if removed > 0 {
                    tracing::debug!(removed, "cache cleaner evicted expired entries");
                }
            }
        });
    }

    /// Runs `refresh` (the downstream chain re-resolve) under a
    /// single-flight lock keyed by `fp`, storing the result on success.
    /// Errors are logged, never surfaced to the lazy-hit caller that
    /// already got its synthetic response.
    pub async fn refresh<F, Fut>(self: &Arc<Self>, fp: Fingerprint, now: u64, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<DnsPacket>> + Send + 'static,
    {
        let cache = self.clone();
        let key = fp.clone();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(LAZY_REFRESH_TIMEOUT, async {
                cache.single_flight.run(key.clone(), refresh).await
            })
            .await;

            match outcome {
                Ok(Ok(response)) => {
                    if let Err(err) = cache.store(&key, &response, now, None).await {
                        tracing::debug!(%err, "lazy refresh store failed");
                    }
                }
                Ok(Err(err)) => tracing::debug!(%err, "lazy refresh fetch failed"),
                Err(_) => tracing::debug!("lazy refresh timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsResourceRecord, DnsResourceType, RData};

    fn sample_response(ttl: u32) -> DnsPacket {
        let mut packet = DnsPacket::new_query(42, "example.com", DnsResourceType::A);
        packet.header.qr = true;
        packet.answers.push(DnsResourceRecord {
            labels: vec!["example".into(), "com".into()],
            rtype: DnsResourceType::A,
            rclass: crate::dns::DnsResourceClass::IN,
            ttl,
            rdata: RData::A(std::net::Ipv4Addr::new(93, 184, 216, 34)),
        });
        packet.update_counts();
        packet
    }

    #[test]
    fn storage_ttl_caps_empty_noerror() {
        let mut empty = DnsPacket::new_query(1, "example.com", DnsResourceType::A);
        empty.header.qr = true;
        assert_eq!(storage_ttl(&empty, None), Some(EMPTY_NOERROR_TTL));
    }

    #[test]
    fn storage_ttl_uses_answer_min_ttl() {
        let response = sample_response(120);
        assert_eq!(storage_ttl(&response, None), Some(120));
    }

    #[test]
    fn truncated_responses_are_not_cached() {
        let mut response = sample_response(120);
        response.header.tc = true;
        assert_eq!(storage_ttl(&response, None), None);
    }

    #[tokio::test]
    async fn round_trips_through_local_shard() {
        let cache = Cache::new(1024, 4, None);
        let fp = Fingerprint::new(
            &crate::dns::DnsQuestion {
                labels: vec!["example".into(), "com".into()],
                qtype: DnsResourceType::A,
                qclass: crate::dns::DnsResourceClass::IN,
            },
            false,
            false,
            false,
        );
        let response = sample_response(120);
        cache.store(&fp, &response, 1_000, None).await.unwrap();

        match cache.lookup(&fp, 1_010).await {
            Some(Lookup::Fresh(got)) => {
                assert_eq!(got.answers[0].ttl, 110);
            }
            Some(Lookup::Lazy(_)) => panic!("expected a fresh hit, got a lazy one"),
            None => panic!("expected a cache hit"),
        }
    }
}
