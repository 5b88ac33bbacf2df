//! # Aegis Gateway
//!
//! HTTP surface of the prompt-inspection gateway: configuration, route
//! matching, caller identity, the inspection middleware, upstream forwarding,
//! and health/metrics endpoints. Decision logic lives in `aegis-core`.

pub mod config;
pub mod forward;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod problem;
pub mod router;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod telemetry;

pub use config::{ConfigError, GatewayConfig};
pub use pipeline::{InspectionPipeline, Outcome, Rejection, CONFIRM_TOKEN_HEADER, DECISION_HEADER};
pub use router::create_router;
pub use state::{AppState, GatewaySettings};
