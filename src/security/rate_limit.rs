//! Per-caller token-bucket rate limiting.
//!
//! # Design Decisions
//! - One bucket per caller id, created full on first sight
//! - Registry behind a readers-writer lock: lookups share the read lock,
//!   creation takes the write lock
//! - Each bucket has its own mutex so callers never contend with each other
//! - A rejected request consumes nothing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        if now > self.last_update {
            self.last_update = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Registry of per-caller buckets sharing one rate and burst.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    refill_rate: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            refill_rate: requests_per_second as f64,
            burst: burst_size as f64,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Admit or reject one request from `caller`.
    pub fn try_acquire(&self, caller: &str) -> bool {
        self.try_acquire_at(caller, Instant::now())
    }

    pub fn try_acquire_at(&self, caller: &str, now: Instant) -> bool {
        let bucket = self.bucket(caller, now);
        let admitted = bucket.lock().try_acquire(self.burst, self.refill_rate, now);
        admitted
    }

    fn bucket(&self, caller: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().get(caller) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write();
        // another task may have created it between the two locks
        let bucket = buckets
            .entry(caller.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.burst, now))))
            .clone();
        metrics::set_rate_limit_buckets(buckets.len());
        bucket
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}
