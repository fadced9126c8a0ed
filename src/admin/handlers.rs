use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::http::context::RequestContext;
use crate::http::response::Envelope;
use crate::http::state::GatewayState;
use crate::store::{Grant, StoreError};

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub mode: &'static str,
    pub store: &'static str,
    pub nonce_cache: &'static str,
    pub routes: usize,
    pub rate_limit_buckets: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WhoAmI {
    pub trace_id: String,
    pub route: String,
    pub caller_id: Option<String>,
    pub subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantInput {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantAssignment {
    pub app_uuid: String,
    #[serde(default)]
    pub grants: Vec<GrantInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantAssignmentResult {
    pub app_uuid: String,
    pub granted: usize,
}

pub async fn ping() -> Envelope<&'static str> {
    Envelope::success("pong")
}

pub async fn whoami(ctx: RequestContext) -> Envelope<WhoAmI> {
    Envelope::success(WhoAmI {
        trace_id: ctx.trace_id.clone(),
        route: ctx.route.clone(),
        caller_id: ctx.caller_id().map(str::to_string),
        subject_id: ctx.subject_id().map(str::to_string),
    })
}

pub async fn get_status(State(state): State<Arc<GatewayState>>) -> Envelope<SystemStatus> {
    Envelope::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        mode: state.config.mode.as_str(),
        store: state.store.backend(),
        nonce_cache: state
            .nonce_cache
            .as_ref()
            .map(|cache| cache.backend())
            .unwrap_or("none"),
        routes: state.routes.routes().len(),
        rate_limit_buckets: state.rate_limiter.bucket_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Replace the grant set of one app in a single transaction.
pub async fn replace_grants(
    State(state): State<Arc<GatewayState>>,
    ctx: RequestContext,
    Json(assignment): Json<GrantAssignment>,
) -> Result<Envelope<GrantAssignmentResult>, ApiError> {
    let app_uuid = assignment.app_uuid.trim().to_string();
    if app_uuid.is_empty() {
        return Err(ApiError::bad_request("app_uuid is required"));
    }

    let mut grants = Vec::with_capacity(assignment.grants.len());
    for input in assignment.grants {
        let method = input.method.trim().to_ascii_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(ApiError::bad_request(format!("unsupported method {}", input.method)));
        }
        if !input.path.starts_with('/') {
            return Err(ApiError::bad_request("grant path must start with '/'"));
        }
        grants.push(Grant {
            app_uuid: app_uuid.clone(),
            path: input.path,
            method,
            resource: input.resource,
        });
    }

    let granted = grants.len();
    match state.store.replace_grants(&app_uuid, grants).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => return Err(ApiError::not_found("app not found")),
        Err(err) => return Err(err.into()),
    }

    tracing::info!(
        trace_id = %ctx.trace_id,
        app_uuid = %app_uuid,
        granted,
        subject_id = ctx.subject_id().unwrap_or("-"),
        "Grants replaced"
    );

    Ok(Envelope::success(GrantAssignmentResult { app_uuid, granted }))
}

/// Fallback for unrouted paths.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}
