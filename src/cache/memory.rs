//! Process-local nonce cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CacheError, Claim, NonceCache};

#[derive(Debug, Clone, Copy)]
struct NonceRecord {
    timestamp: i64,
    expires_at: Instant,
}

/// Nonce cache held in a concurrent map. Expired keys are reclaimed on
/// contact and by `purge_expired`.
#[derive(Default)]
pub struct MemoryNonceCache {
    entries: DashMap<String, NonceRecord>,
}

impl MemoryNonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` as of `now`. The shard lock held by `entry` makes the
    /// check and the insert a single step.
    pub fn claim_at(&self, key: &str, timestamp: i64, ttl: Duration, now: Instant) -> Claim {
        let record = NonceRecord {
            timestamp,
            expires_at: now + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(record);
                    Claim::Fresh
                } else {
                    Claim::Replayed
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Claim::Fresh
            }
        }
    }

    /// Request timestamp stored under `key`, while the record is live.
    pub fn recorded_timestamp(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|record| record.expires_at > now)
            .map(|record| record.timestamp)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl NonceCache for MemoryNonceCache {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn claim(&self, key: &str, timestamp: i64, ttl: Duration) -> Result<Claim, CacheError> {
        Ok(self.claim_at(key, timestamp, ttl, Instant::now()))
    }
}
