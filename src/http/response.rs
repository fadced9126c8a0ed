//! Uniform response envelope.
//!
//! # Responsibilities
//! - Wrap every success and failure as `{ trace_id, code, message, data }`
//! - Stamp the envelope with the trace id of the request being served
//! - Leave an `EnvelopeMeta` marker on the response for the audit wrapper
//!
//! # Design Decisions
//! - HTTP status mirrors the envelope code
//! - The trace id is read from a task-local set by the trace middleware, so
//!   handlers and `ApiError` never have to thread it by hand

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Run `fut` with `trace_id` visible to envelopes rendered inside it.
pub async fn with_trace_id<F>(trace_id: String, fut: F) -> F::Output
where
    F: std::future::Future,
{
    TRACE_ID.scope(trace_id, fut).await
}

/// Trace id of the request executing on this task, or empty outside a request.
pub fn current_trace_id() -> String {
    TRACE_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// JSON body shared by every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub trace_id: String,
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

/// Code and message of a rendered envelope, left in response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeMeta {
    pub code: u16,
    pub message: String,
}

impl<T: Serialize> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            trace_id: current_trace_id(),
            code: StatusCode::OK.as_u16(),
            message: "Success".to_string(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    /// Failure envelope for the current request.
    pub fn failure(err: &ApiError) -> Self {
        Self::failure_with_trace(current_trace_id(), err)
    }

    /// Failure envelope with an explicit trace id (used outside the task-local scope).
    pub fn failure_with_trace(trace_id: String, err: &ApiError) -> Self {
        Self {
            trace_id,
            code: err.code(),
            message: err.message().to_string(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let meta = EnvelopeMeta {
            code: self.code,
            message: self.message.clone(),
        };
        let mut response = (status, Json(self)).into_response();
        response.extensions_mut().insert(meta);
        response
    }
}
