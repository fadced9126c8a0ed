//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, method)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched route policy, or the default policy
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers and stage pipelines
//!     → Freeze as immutable PolicyRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)

pub mod matcher;
pub mod router;

pub use router::{CompiledRoute, PolicyRouter};
