//! Pipeline middleware.
//!
//! # Responsibilities
//! - Select the route policy for the request
//! - Buffer the body when the signature stage or the audit wrapper needs it,
//!   and hand the same bytes on to the handler
//! - Run the compiled stages, rendering the first rejection as an envelope
//! - Insert the final `RequestContext` for handlers
//! - Record the operation log after the handler returns

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::audit::AuditRecorder;
use super::signature::SIGNATURE_HEADER;
use super::{PipelineRequest, Rejection};
use crate::config::SignatureMode;
use crate::error::ApiError;
use crate::http::context::{RequestContext, TraceId};
use crate::http::request::client_ip;
use crate::http::response::current_trace_id;
use crate::http::state::GatewayState;
use crate::observability::metrics;

pub async fn pipeline_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let (mut parts, body) = request.into_parts();

    let route = state.routes.match_route(&parts);
    let policy = &route.policy;
    let path = parts.uri.path().to_string();

    let trace_id = parts
        .extensions
        .get::<TraceId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(current_trace_id);
    let mut ctx = RequestContext::new(trace_id);
    ctx.client_ip = client_ip(&parts);
    ctx.route = route.name.clone();

    let audited = policy.audit && state.audit.should_record(&path);
    let max_body_bytes = state.config.signature.max_body_bytes;
    let signs_body = policy.signature != SignatureMode::Off
        && parts.headers.contains_key(SIGNATURE_HEADER);
    // Audit alone never rejects: bodies of unknown or oversized length
    // stream through and are logged without params.
    let audits_body = audited
        && AuditRecorder::captures_body(&parts.headers)
        && declared_length(&parts.headers).is_some_and(|len| len <= max_body_bytes);

    let (buffered, body): (Option<Bytes>, Option<Body>) = if signs_body || audits_body {
        match axum::body::to_bytes(body, max_body_bytes).await {
            Ok(bytes) => (Some(bytes), None),
            Err(err) => {
                let rejection = Rejection {
                    stage: "body",
                    error: ApiError::bad_request("request body is too large or unreadable"),
                };
                log_rejection(&rejection, &ctx, &parts.method, &path, &err.to_string());
                return rejection.error.into_response();
            }
        }
    } else {
        (None, Some(body))
    };

    let mut pipeline_request = PipelineRequest {
        method: &parts.method,
        path: &path,
        headers: &parts.headers,
        body: buffered.as_ref(),
        ctx,
    };

    if let Err(rejection) = route.pipeline.run(&mut pipeline_request).await {
        log_rejection(
            &rejection,
            &pipeline_request.ctx,
            &parts.method,
            &path,
            rejection.error.message(),
        );
        return rejection.error.into_response();
    }

    let ctx = pipeline_request.ctx;
    let params = if audited {
        state.audit.params(&parts.headers, buffered.as_ref())
    } else {
        String::new()
    };
    let method = parts.method.clone();

    parts.extensions.insert(ctx.clone());
    let body = body.unwrap_or_else(|| Body::from(buffered.unwrap_or_default()));
    let response = next.run(Request::from_parts(parts, body)).await;

    if audited {
        let entry = AuditRecorder::entry(&ctx, &method, &path, &response, params, started);
        state.audit.record(entry).await;
    }

    response
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn log_rejection(
    rejection: &Rejection,
    ctx: &RequestContext,
    method: &axum::http::Method,
    path: &str,
    reason: &str,
) {
    metrics::record_rejection(rejection.stage, rejection.error.code());
    tracing::warn!(
        trace_id = %ctx.trace_id,
        stage = rejection.stage,
        path = %path,
        method = %method,
        client_ip = ?ctx.client_ip,
        caller_id = ctx.caller_id().unwrap_or("-"),
        code = rejection.error.code(),
        reason = %reason,
        "Request rejected"
    );
}
