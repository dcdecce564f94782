use crate::error::{ForwarderError, Result};

/// A stored response: the wire bytes plus the times needed to recompute
/// remaining TTLs on retrieval. Redis layout is big-endian
/// `stored_at ‖ expires_at ‖ payload`, stable across process restarts.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stored_at: u64,
    pub expires_at: u64,
    pub payload: Vec<u8>,
}

impl CacheEntry {
    pub fn new(stored_at: u64, ttl_secs: u64, payload: Vec<u8>) -> Self {
        Self {
            stored_at,
            expires_at: stored_at + ttl_secs,
            payload,
        }
    }

    pub fn is_hard_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    pub fn to_redis_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.payload.len());
        buf.extend_from_slice(&self.stored_at.to_be_bytes());
        buf.extend_from_slice(&self.expires_at.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn from_redis_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 16 {
            return Err(ForwarderError::CacheBackend(
                "entry shorter than the 16-byte header".into(),
            ));
        }
        let stored_at = u64::from_be_bytes(raw[0..8].try_into().unwrap());
        let expires_at = u64::from_be_bytes(raw[8..16].try_into().unwrap());
        Ok(Self {
            stored_at,
            expires_at,
            payload: raw[16..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_redis_layout() {
        let entry = CacheEntry::new(1_000, 30, vec![1, 2, 3, 4]);
        let bytes = entry.to_redis_bytes();
        let decoded = CacheEntry::from_redis_bytes(&bytes).unwrap();
        assert_eq!(decoded.stored_at, 1_000);
        assert_eq!(decoded.expires_at, 1_030);
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
    }
}
