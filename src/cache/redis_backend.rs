use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::cache::entry::CacheEntry;
use crate::cache::fingerprint::Fingerprint;
use crate::error::{ForwarderError, Result};

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Redis-backed remote cache, wrapped in a circuit breaker: any non-miss
/// error disables the backend and schedules a jittered exponential
/// backoff ping retry (100 ms -> 30 s) before re-enabling it.
pub struct RedisBackend {
    conn: ConnectionManager,
    key_prefix: String,
    open: Arc<AtomicBool>,
    backoff: Mutex<Duration>,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ForwarderError::CacheBackend(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ForwarderError::CacheBackend(format!("redis connect failed: {e}")))?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
            open: Arc::new(AtomicBool::new(true)),
            backoff: Mutex::new(MIN_BACKOFF),
        })
    }

    fn redis_key(&self, fp: &Fingerprint) -> String {
        let mut key = String::with_capacity(self.key_prefix.len() + fp.as_bytes().len() * 2 + 1);
        key.push_str(&self.key_prefix);
        key.push(':');
        for byte in fp.as_bytes() {
            key.push_str(&format!("{byte:02x}"));
        }
        key
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub async fn get(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        if !self.is_open() {
            return None;
        }
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<Vec<u8>>>(self.redis_key(fp)).await {
            Ok(Some(raw)) => CacheEntry::from_redis_bytes(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                self.trip(err);
                None
            }
        }
    }

    pub async fn set(&self, fp: &Fingerprint, entry: &CacheEntry, ttl_secs: u64) {
        if !self.is_open() {
            return;
        }
        let mut conn = self.conn.clone();
        let key = self.redis_key(fp);
        let bytes = entry.to_redis_bytes();
        if let Err(err) = conn
            .set_ex::<_, _, ()>(key, bytes, ttl_secs.max(1))
            .await
        {
            self.trip(err);
        }
    }

    fn trip(&self, err: redis::RedisError) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::warn!(%err, "redis cache backend tripped, entering backoff");
            self.spawn_recovery();
        }
    }

    fn spawn_recovery(&self) {
        let open = self.open.clone();
        let conn = self.conn.clone();
        tokio::spawn(async move {
            let mut delay = MIN_BACKOFF;
            loop {
                let jitter_ms = rand::rng().random_range(0..=delay.as_millis() as u64 / 4 + 1);
                tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;

                let mut probe = conn.clone();
                let ping: redis::RedisResult<String> =
                    redis::cmd("PING").query_async(&mut probe).await;
                if ping.is_ok() {
                    open.store(true, Ordering::SeqCst);
                    tracing::info!("redis cache backend recovered");
                    return;
                }
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_key_is_hex_encoded_fingerprint() {
        let backend_prefix = "dnscache";
        let fp_bytes: Vec<u8> = vec![0x01, 0xab];
        let key = format!(
            "{backend_prefix}:{}",
            fp_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
        );
        assert_eq!(key, "dnscache:01ab");
    }
}
