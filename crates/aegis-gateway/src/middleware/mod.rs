//! Middleware layers
//!
//! ## Available Middleware
//!
//! - `route`: path-prefix route matching
//! - `caller`: HMAC caller identity (only when a shared secret is configured)
//! - `inspection`: prompt inspection and policy enforcement
//! - `panic`: 500 problem documents for handler panics

pub mod caller;
pub mod inspection;
pub mod panic;
pub mod route;

// Re-exports
pub use caller::{caller_identity_middleware, AuthenticatedCaller};
pub use inspection::inspection_middleware;
pub use panic::PanicResponder;
pub use route::route_match_middleware;
