//! Shared application state.

use crate::config::{AuthConfig, Environment, FailureMode, GatewayConfig};
use crate::forward::UpstreamForwarder;
use crate::pipeline::InspectionPipeline;
use crate::routes::RouteTable;
use axum::http::StatusCode;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Settings the request path reads on every call.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub max_body_bytes: usize,
    pub confirm_status: StatusCode,
    pub on_failure: FailureMode,
    pub expose_error_detail: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_body_bytes: config.server.max_body_bytes,
            confirm_status: config.confirm.status_code.status_code(),
            on_failure: config.inspection.on_failure,
            expose_error_detail: config.server.environment == Environment::Development,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InspectionPipeline>,
    pub routes: Arc<RouteTable>,
    pub forwarder: Arc<dyn UpstreamForwarder>,
    pub settings: Arc<GatewaySettings>,
    pub auth: Arc<AuthConfig>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        pipeline: InspectionPipeline,
        routes: RouteTable,
        forwarder: Arc<dyn UpstreamForwarder>,
        settings: GatewaySettings,
        auth: AuthConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            routes: Arc::new(routes),
            forwarder,
            settings: Arc::new(settings),
            auth: Arc::new(auth),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
