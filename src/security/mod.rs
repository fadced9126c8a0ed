//! Security primitives used by the pipeline stages.
//!
//! # Contents
//! ```text
//! signature.rs  → HMAC-SHA256 body signatures (constant-time verify)
//! token.rs      → HMAC bearer tokens: issue, verify, mask
//! rate_limit.rs → per-caller token buckets
//! headers.rs    → security response headers, CORS
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Primitives are framework-free; the pipeline adapts them to requests

pub mod headers;
pub mod rate_limit;
pub mod signature;
pub mod token;

pub use rate_limit::RateLimiter;
pub use token::TokenService;
