//! Request spans.
//!
//! Every request span carries the trace id so log lines emitted anywhere in
//! the pipeline correlate with the `trace_id` in the response envelope.

use axum::body::Body;
use axum::http::Request;
use tracing::Span;

use crate::http::context::TraceId;

/// `make_span_with` callback for `TraceLayer`.
pub fn request_span(request: &Request<Body>) -> Span {
    let trace_id = request
        .extensions()
        .get::<TraceId>()
        .map(|id| id.0.as_str())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}
