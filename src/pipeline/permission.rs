//! Grant check for the resolved caller.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineRequest, Stage};
use crate::error::ApiError;
use crate::store::GatewayStore;

/// Requires a grant matching (caller, exact path, exact method).
pub struct PermissionStage {
    store: Arc<dyn GatewayStore>,
}

impl PermissionStage {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for PermissionStage {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        let denied = || ApiError::forbidden("permission denied");

        let Some(caller_id) = req.ctx.caller_id() else {
            return Err(denied());
        };

        match self
            .store
            .find_grant(caller_id, req.path, req.method.as_str())
            .await
        {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(denied()),
            Err(err) => {
                tracing::error!(
                    trace_id = %req.ctx.trace_id,
                    caller_id = %caller_id,
                    error = %err,
                    "Grant lookup failed"
                );
                Err(denied())
            }
        }
    }
}
