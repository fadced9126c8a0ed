//! Typed per-request state threaded through the pipeline.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::store::App;

/// Correlation id of a request, inserted into request extensions by the trace middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// State accumulated by the pipeline stages and handed to the business handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub trace_id: String,
    pub client_ip: Option<IpAddr>,
    /// Registered caller resolved by the signature or API-key stage.
    pub caller: Option<Arc<App>>,
    /// End-user id extracted from the bearer token.
    pub subject: Option<String>,
    /// Name of the matched route policy.
    pub route: String,
}

impl RequestContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            ..Default::default()
        }
    }

    pub fn caller_id(&self) -> Option<&str> {
        self.caller.as_deref().map(|app| app.uuid.as_str())
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::internal("request context missing"))
    }
}
