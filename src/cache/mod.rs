//! Replay-protection cache.
//!
//! # Responsibilities
//! - Record a nonce key with a time-to-live, atomically and only once
//! - Report whether the key was newly recorded or already present
//!
//! # Design Decisions
//! - A single `claim` operation; there is no separate exists/set pair
//! - Backend failures are errors, never "not present"

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryNonceCache;
pub use self::redis::RedisNonceCache;

/// Error type for cache operations.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The key was absent and is now recorded.
    Fresh,
    /// The key was already recorded and has not expired.
    Replayed,
}

/// Atomic set-if-absent store with expiry.
#[async_trait]
pub trait NonceCache: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Record `key` with the request `timestamp` for `ttl`, unless it is
    /// already present.
    async fn claim(&self, key: &str, timestamp: i64, ttl: Duration) -> Result<Claim, CacheError>;
}
