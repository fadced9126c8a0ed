//! Request authentication pipeline.
//!
//! # Data Flow
//! ```text
//! composer.rs (axum middleware, per request):
//!     match route → buffer body if needed
//!     → nonce → signature → api key → rate limit → token → permission
//!     → handler
//!     → audit (when enabled for the route)
//! ```
//!
//! # Design Decisions
//! - Each route's stage list is compiled once at startup
//! - A stage either annotates the `RequestContext` or returns an `ApiError`;
//!   the first error ends the run and nothing later executes
//! - Stages never write responses; the composer renders the envelope

pub mod api_key;
pub mod audit;
pub mod composer;
pub mod nonce;
pub mod permission;
pub mod rate_limit;
pub mod signature;
pub mod token;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use crate::cache::NonceCache;
use crate::config::{GatewayConfig, PolicyConfig, SignatureMode};
use crate::error::ApiError;
use crate::http::context::RequestContext;
use crate::security::{RateLimiter, TokenService};
use crate::store::GatewayStore;

pub use composer::pipeline_middleware;

/// The view of a request that stages inspect.
pub struct PipelineRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// Raw body, present only when the route buffers it.
    pub body: Option<&'a Bytes>,
    pub ctx: RequestContext,
}

impl<'a> PipelineRequest<'a> {
    /// Trimmed, non-empty header value.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// One ordered step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError>;
}

/// A stage failure, tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub stage: &'static str,
    pub error: ApiError,
}

/// Shared collaborators handed to stages at compile time.
#[derive(Clone)]
pub struct StageDeps {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn GatewayStore>,
    pub nonce_cache: Option<Arc<dyn NonceCache>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenService>,
}

/// Ordered, short-circuiting list of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Build the stage list for `policy`.
    pub fn compile(policy: &PolicyConfig, deps: &StageDeps) -> Self {
        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();

        if policy.nonce {
            stages.push(Arc::new(nonce::NonceStage::new(
                deps.nonce_cache.clone(),
                &deps.config.nonce,
            )));
        }
        if policy.signature != SignatureMode::Off {
            stages.push(Arc::new(signature::SignatureStage::new(
                deps.store.clone(),
                policy.signature,
            )));
        }
        // the permission gate needs a resolved caller
        if policy.api_key || policy.permission {
            stages.push(Arc::new(api_key::ApiKeyStage::new(deps.store.clone())));
        }
        if policy.rate_limit {
            stages.push(Arc::new(rate_limit::RateLimitStage::new(
                deps.rate_limiter.clone(),
            )));
        }
        if policy.login {
            stages.push(Arc::new(token::TokenStage::new(deps.tokens.clone())));
        }
        if policy.permission {
            stages.push(Arc::new(permission::PermissionStage::new(deps.store.clone())));
        }

        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run(&self, req: &mut PipelineRequest<'_>) -> Result<(), Rejection> {
        for stage in &self.stages {
            stage.apply(req).await.map_err(|error| Rejection {
                stage: stage.name(),
                error,
            })?;
        }
        Ok(())
    }
}
