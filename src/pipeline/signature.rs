//! Body signature verification.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PipelineRequest, Stage};
use crate::config::SignatureMode;
use crate::error::ApiError;
use crate::security::signature;
use crate::store::GatewayStore;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const APP_ID_HEADER: &str = "x-app-id";

/// Verifies `X-Signature` against the buffered body using the secret of the
/// app named by `X-App-Id`, then records that app as the caller.
pub struct SignatureStage {
    store: Arc<dyn GatewayStore>,
    mode: SignatureMode,
}

impl SignatureStage {
    pub fn new(store: Arc<dyn GatewayStore>, mode: SignatureMode) -> Self {
        Self { store, mode }
    }
}

#[async_trait]
impl Stage for SignatureStage {
    fn name(&self) -> &'static str {
        "signature"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        let Some(provided) = req.header(SIGNATURE_HEADER) else {
            return match self.mode {
                SignatureMode::Required => Err(ApiError::forbidden("signature is required")),
                _ => Ok(()),
            };
        };

        let app_id = req
            .header(APP_ID_HEADER)
            .ok_or_else(|| ApiError::forbidden("X-App-Id is empty"))?;

        let app = match self.store.find_app_by_uuid(app_id).await {
            Ok(Some(app)) if app.is_enabled() => app,
            Ok(_) => return Err(ApiError::forbidden("app is invalid")),
            Err(err) => {
                tracing::error!(trace_id = %req.ctx.trace_id, error = %err, "App lookup failed");
                return Err(ApiError::forbidden("app is invalid"));
            }
        };

        let body: &[u8] = req.body.map(|b| &b[..]).unwrap_or(&[]);
        if !signature::verify(provided, body, app.secret_key.as_bytes()) {
            return Err(ApiError::forbidden("signature is invalid"));
        }

        req.ctx.caller = Some(Arc::new(app));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{request, store, APP_ID, SECRET};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue, Method};

    fn signed_headers(app_id: &str, sig: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(APP_ID_HEADER, HeaderValue::from_str(app_id).unwrap());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(sig).unwrap());
        headers
    }

    async fn run(
        stage: &SignatureStage,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> (Result<(), ApiError>, Option<String>) {
        let mut req = request(&Method::POST, "/api", headers, Some(body));
        let result = stage.apply(&mut req).await;
        (result, req.ctx.caller_id().map(str::to_string))
    }

    #[tokio::test]
    async fn test_valid_signature_resolves_caller() {
        let stage = SignatureStage::new(store(), SignatureMode::Optional);
        let body = Bytes::from_static(br#"{"a":1}"#);
        let sig = signature::sign(&body, SECRET.as_bytes());

        let (result, caller) = run(&stage, &signed_headers(APP_ID, &sig), &body).await;
        assert!(result.is_ok());
        assert_eq!(caller.as_deref(), Some(APP_ID));
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let stage = SignatureStage::new(store(), SignatureMode::Optional);
        let sig = signature::sign(br#"{"a":1}"#, SECRET.as_bytes());
        let tampered = Bytes::from_static(br#"{"a":2}"#);

        let (result, caller) = run(&stage, &signed_headers(APP_ID, &sig), &tampered).await;
        assert_eq!(result.unwrap_err(), ApiError::forbidden("signature is invalid"));
        assert!(caller.is_none());
    }

    #[tokio::test]
    async fn test_unknown_or_disabled_app_rejected() {
        let stage = SignatureStage::new(store(), SignatureMode::Optional);
        let body = Bytes::new();
        let sig = signature::sign(&body, SECRET.as_bytes());

        let (result, _) = run(&stage, &signed_headers("ghost", &sig), &body).await;
        assert_eq!(result.unwrap_err().code(), 403);
        let (result, _) = run(&stage, &signed_headers("app-off", &sig), &body).await;
        assert_eq!(result.unwrap_err().code(), 403);
    }

    #[tokio::test]
    async fn test_missing_signature_depends_on_mode() {
        let body = Bytes::new();
        let headers = HeaderMap::new();

        let optional = SignatureStage::new(store(), SignatureMode::Optional);
        assert!(run(&optional, &headers, &body).await.0.is_ok());

        let required = SignatureStage::new(store(), SignatureMode::Required);
        assert_eq!(
            run(&required, &headers, &body).await.0.unwrap_err(),
            ApiError::forbidden("signature is required")
        );
    }
}
