//! Redis-backed nonce cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CacheError, Claim, NonceCache};
use crate::config::RedisConfig;

/// Nonce cache using `SET key <timestamp> NX EX ttl` on a managed connection.
#[derive(Clone)]
pub struct RedisNonceCache {
    manager: ConnectionManager,
}

impl RedisNonceCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|err| CacheError::Unavailable(format!("redis client: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| CacheError::Unavailable(format!("redis connect: {err}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl NonceCache for RedisNonceCache {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn claim(&self, key: &str, timestamp: i64, ttl: Duration) -> Result<Claim, CacheError> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(timestamp)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|err| CacheError::Command(format!("redis set nx: {err}")))?;

        // OK when written, nil when the key already existed
        Ok(match reply {
            Some(_) => Claim::Fresh,
            None => Claim::Replayed,
        })
    }
}
