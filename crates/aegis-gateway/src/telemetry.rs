//! Logging and metrics setup.

use crate::config::{LogFormat, LoggingConfig};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

pub const PIPELINE_DECISIONS: &str = "aegis_pipeline_decisions_total";
pub const POLICY_UNRESOLVED: &str = "aegis_policy_unresolved_total";
pub const INSPECTION_FAILURES: &str = "aegis_inspection_failures_total";
pub const INSPECTION_DURATION: &str = "aegis_inspection_duration_seconds";

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured filter.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

/// Install the Prometheus recorder and describe the gateway's metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(PIPELINE_DECISIONS, "Inspection pipeline decisions by outcome");
    metrics::describe_counter!(
        POLICY_UNRESOLVED,
        "Routes referencing a policy id that is not configured"
    );
    metrics::describe_counter!(INSPECTION_FAILURES, "Inspection service failures by kind");
    metrics::describe_histogram!(
        INSPECTION_DURATION,
        metrics::Unit::Seconds,
        "Inspection service round-trip time"
    );

    Ok(handle)
}
