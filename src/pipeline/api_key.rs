//! API-key caller resolution.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineRequest, Stage};
use crate::error::ApiError;
use crate::store::GatewayStore;

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct ApiKeyStage {
    store: Arc<dyn GatewayStore>,
}

impl ApiKeyStage {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for ApiKeyStage {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        let presented = req.header(API_KEY_HEADER);

        // Already resolved by the signature stage. A key naming some other
        // app must not ride on that app's signature.
        if let Some(caller) = &req.ctx.caller {
            return match presented {
                Some(key) if key != caller.api_key => {
                    Err(ApiError::forbidden("api key does not match app"))
                }
                _ => Ok(()),
            };
        }

        let key = presented.ok_or_else(|| ApiError::forbidden("X-Api-Key is empty"))?;

        match self.store.find_app_by_api_key(key).await {
            Ok(Some(app)) if app.is_enabled() => {
                req.ctx.caller = Some(Arc::new(app));
                Ok(())
            }
            Ok(_) => Err(ApiError::forbidden("api key is invalid")),
            Err(err) => {
                tracing::error!(trace_id = %req.ctx.trace_id, error = %err, "App lookup failed");
                Err(ApiError::forbidden("api key is invalid"))
            }
        }
    }
}
