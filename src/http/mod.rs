//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, graceful shutdown)
//!     → request.rs (trace id, panic boundary, envelope fallback)
//!     → pipeline (per-route authentication stages)
//!     → handler, reading context.rs
//!     → response.rs (envelope)
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use context::{RequestContext, TraceId};
pub use request::X_TRACE_ID;
pub use response::Envelope;
pub use server::GatewayServer;
pub use state::GatewayState;
