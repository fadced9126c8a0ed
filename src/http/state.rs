//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::NonceCache;
use crate::config::GatewayConfig;
use crate::pipeline::audit::AuditRecorder;
use crate::pipeline::StageDeps;
use crate::routing::PolicyRouter;
use crate::security::{RateLimiter, TokenService};
use crate::store::GatewayStore;

/// Everything a request may touch, built once at startup and injected into
/// the middleware stack and handlers.
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn GatewayStore>,
    pub nonce_cache: Option<Arc<dyn NonceCache>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenService>,
    pub routes: PolicyRouter,
    pub audit: AuditRecorder,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn GatewayStore>,
        nonce_cache: Option<Arc<dyn NonceCache>>,
    ) -> Self {
        let config = Arc::new(config);
        let deps = StageDeps {
            config: config.clone(),
            store: store.clone(),
            nonce_cache: nonce_cache.clone(),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            tokens: Arc::new(TokenService::from_config(&config.auth)),
        };

        let routes = PolicyRouter::compile(&config, &deps);
        let audit = AuditRecorder::new(store.clone(), &config.audit);

        Self {
            config,
            store,
            nonce_cache,
            rate_limiter: deps.rate_limiter,
            tokens: deps.tokens,
            routes,
            audit,
            started_at: Instant::now(),
        }
    }
}
