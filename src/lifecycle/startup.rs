//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the store and the nonce cache named by configuration
//! - Start background maintenance (in-memory nonce purge)
//! - Assemble the shared `GatewayState`
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{MemoryNonceCache, NonceCache, RedisNonceCache};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::GatewayState;
use crate::lifecycle::Shutdown;
use crate::store::{GatewayStore, MemoryStore, PgStore};

pub async fn connect_store(config: &GatewayConfig) -> Result<Arc<dyn GatewayStore>, GatewayError> {
    if config.database.url.is_empty() {
        tracing::warn!("database.url is empty; using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(&config.database).await?;
    if config.database.ensure_schema {
        store.ensure_schema().await?;
    }
    tracing::info!(max_connections = config.database.max_connections, "Connected to PostgreSQL");
    Ok(Arc::new(store))
}

/// The configured nonce cache, or `None` when no shared cache exists.
pub async fn connect_nonce_cache(
    config: &GatewayConfig,
    shutdown: &Shutdown,
) -> Result<Option<Arc<dyn NonceCache>>, GatewayError> {
    if !config.redis.url.is_empty() {
        let cache = RedisNonceCache::connect(&config.redis).await?;
        tracing::info!("Connected to Redis nonce cache");
        return Ok(Some(Arc::new(cache)));
    }

    if config.redis.memory_fallback {
        let cache = Arc::new(MemoryNonceCache::new());
        spawn_purge(
            cache.clone(),
            Duration::from_secs(config.nonce.purge_interval_secs.max(1)),
            shutdown.clone(),
        );
        tracing::warn!("redis.url is empty; nonces are tracked in process memory");
        return Ok(Some(cache));
    }

    tracing::warn!("No nonce cache configured; nonce-protected routes will answer 503");
    Ok(None)
}

fn spawn_purge(cache: Arc<MemoryNonceCache>, every: Duration, shutdown: Shutdown) {
    tokio::spawn(async move {
        let mut signal = shutdown.subscribe();
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = cache.len(), "Purged expired nonces");
                    }
                }
                _ = signal.recv() => break,
            }
        }
    });
}

/// Connect collaborators and build the shared state.
pub async fn build_state(
    config: GatewayConfig,
    shutdown: &Shutdown,
) -> Result<Arc<GatewayState>, GatewayError> {
    let store = connect_store(&config).await?;
    let nonce_cache = connect_nonce_cache(&config, shutdown).await?;
    Ok(Arc::new(GatewayState::new(config, store, nonce_cache)))
}
