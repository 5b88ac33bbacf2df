//! HTTP request handlers

pub mod health;
pub mod metrics;
pub mod proxy;

pub use health::{health, live, ready};
pub use metrics::metrics;
pub use proxy::forward;
