//! Per-caller rate limiting stage.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineRequest, Stage};
use crate::error::ApiError;
use crate::security::RateLimiter;

pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        // No caller, no bucket.
        let Some(caller_id) = req.ctx.caller_id() else {
            return Ok(());
        };

        if self.limiter.try_acquire(caller_id) {
            Ok(())
        } else {
            Err(ApiError::too_many_requests("too many requests"))
        }
    }
}
