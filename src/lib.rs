//! Admin gateway: request authentication in front of a multi-tenant admin backend.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ http::request (trace id, recovery) ──▶ routing (policy per route)
//!                                                            │
//!                                                            ▼
//!                   pipeline: nonce → signature → api key → rate limit → token → permission
//!                                                            │
//!                                                            ▼
//!   Client Response ◀── envelope { trace_id, code, message, data } ◀── handler (+ audit)
//!
//!   Cross-cutting: config, observability, lifecycle, store (apps/grants/op logs), cache (nonces)
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::{ApiError, GatewayError};
pub use http::{Envelope, GatewayServer, GatewayState, RequestContext};
pub use lifecycle::Shutdown;
