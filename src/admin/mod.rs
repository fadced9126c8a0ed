//! Operational endpoints served behind the pipeline.
//!
//! Every route here is guarded by whatever policy its path matches in the
//! route table; nothing in this module checks credentials itself.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::http::state::GatewayState;
use self::handlers::*;

pub fn routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/v1/whoami", get(whoami))
        .route("/api/v1/app/grants", post(replace_grants))
        .route("/admin/status", get(get_status))
}
