//! Operation log recording.
//!
//! # Responsibilities
//! - Decide which paths are recorded (skip list, `*` suffix = prefix match)
//! - Capture JSON request params, truncated
//! - Write one `OpLogEntry` per handled request on audited routes
//!
//! A failed write is logged and otherwise ignored.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method};
use axum::response::Response;
use chrono::Utc;

use crate::config::AuditConfig;
use crate::http::context::RequestContext;
use crate::http::response::EnvelopeMeta;
use crate::store::{GatewayStore, OpLogEntry};

pub struct AuditRecorder {
    store: Arc<dyn GatewayStore>,
    skip: Vec<String>,
    max_params_bytes: usize,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn GatewayStore>, config: &AuditConfig) -> Self {
        Self {
            store,
            skip: config.skip.clone(),
            max_params_bytes: config.max_params_bytes,
        }
    }

    pub fn should_record(&self, path: &str) -> bool {
        !self.skip.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == pattern,
        })
    }

    /// Only JSON bodies are captured as params.
    pub fn captures_body(headers: &HeaderMap) -> bool {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false)
    }

    pub fn params(&self, headers: &HeaderMap, body: Option<&Bytes>) -> String {
        let Some(body) = body.filter(|_| Self::captures_body(headers)) else {
            return String::new();
        };
        let text = String::from_utf8_lossy(body);
        if text.len() <= self.max_params_bytes {
            return text.into_owned();
        }
        let mut end = self.max_params_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }

    pub fn entry(
        ctx: &RequestContext,
        method: &Method,
        path: &str,
        response: &Response,
        params: String,
        started: Instant,
    ) -> OpLogEntry {
        let status = response.status();
        let (code, message) = match response.extensions().get::<EnvelopeMeta>() {
            Some(meta) => (meta.code, meta.message.clone()),
            None => (
                status.as_u16(),
                status.canonical_reason().unwrap_or_default().to_string(),
            ),
        };

        OpLogEntry {
            trace_id: ctx.trace_id.clone(),
            subject_id: ctx.subject.clone(),
            caller_id: ctx.caller_id().map(str::to_string),
            path: path.to_string(),
            method: method.to_string(),
            client_ip: ctx.client_ip.map(|ip| ip.to_string()),
            status: status.as_u16(),
            code,
            message,
            params,
            duration_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        }
    }

    pub async fn record(&self, entry: OpLogEntry) {
        let trace_id = entry.trace_id.clone();
        if let Err(err) = self.store.record_op_log(entry).await {
            tracing::error!(trace_id = %trace_id, error = %err, "Failed to write operation log");
        }
    }
}
