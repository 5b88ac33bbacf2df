//! Aegis gateway server

use aegis_core::{
    HttpInspectionClient, InMemoryConfirmTokenService, PolicyStore, PromptExtractorRegistry,
};
use aegis_gateway::config::{GatewayConfig, DEFAULT_CONFIG_PATH};
use aegis_gateway::forward::ReqwestForwarder;
use aegis_gateway::routes::RouteTable;
use aegis_gateway::{create_router, tasks, telemetry, AppState, GatewaySettings, InspectionPipeline};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = PathBuf::from(
        std::env::var("AEGIS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );
    let config = GatewayConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    telemetry::init_tracing(&config.logging);
    let metrics = telemetry::init_metrics().context("installing metrics recorder")?;

    let extractors = Arc::new(PromptExtractorRegistry::standard());
    warn_on_route_misconfiguration(&config, &extractors);

    let policies = Arc::new(PolicyStore::new(config.policy_table()?));
    let confirm_tokens = Arc::new(InMemoryConfirmTokenService::new(config.confirm.capacity));
    let inspection = Arc::new(HttpInspectionClient::new(
        &config.inspection.base_url,
        config.inspection.timeout(),
    ));

    let pipeline = InspectionPipeline::new(
        policies.clone(),
        extractors,
        inspection,
        confirm_tokens.clone(),
    );
    let forwarder = Arc::new(ReqwestForwarder::new(
        config.server.upstream_timeout(),
        config.server.max_body_bytes,
    ));
    let state = AppState::new(
        pipeline,
        RouteTable::from_settings(&config.routes),
        forwarder,
        GatewaySettings::from(&config),
        config.auth.clone(),
    )
    .with_metrics(metrics);

    tasks::spawn_token_sweeper(
        confirm_tokens,
        Duration::from_secs(config.confirm.sweep_interval_seconds),
    );
    tasks::spawn_sighup_reload(policies, config_path);

    let app = create_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Aegis gateway listening on http://{}", addr);
    info!(
        routes = config.routes.len(),
        policies = config.policies.len(),
        inspection = %config.inspection.base_url,
        "Gateway configured"
    );

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// Log inspected routes that cannot work as configured. The pipeline still
/// fails closed on them at request time.
fn warn_on_route_misconfiguration(config: &GatewayConfig, extractors: &PromptExtractorRegistry) {
    for route in RouteTable::from_settings(&config.routes).iter() {
        if !route.config.inspect_prompt() {
            continue;
        }
        match route.config.prompt_format() {
            None => warn!(route_id = %route.id(), "inspected route has no PromptFormat"),
            Some(format) if !extractors.contains(format) => warn!(
                route_id = %route.id(),
                format,
                available = ?extractors.formats(),
                "inspected route uses an unregistered PromptFormat"
            ),
            Some(_) => {}
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
