//! IPA controller
//!
//! Runs the reconciliation loop over `IPA` resources and serves health and
//! metrics endpoints.

use anyhow::{Context, Result};
use ipa_lib::{
    api::{self, AppState},
    clock::{Clock, SystemClock},
    cluster::{ClusterAccessor, KubeClusterAccessor},
    health::HealthRegistry,
    observability::{ControllerMetrics, StructuredLogger},
    reconcile::{ControllerLoop, ReconcilerBuilder, StatusReporter},
    transport::ReqwestTransport,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ipa-controller");

    let config = config::ControllerConfig::load()?;
    info!(
        node_name = %config.node_name,
        api_port = config.api_port,
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        "Controller configured"
    );

    let health_registry = HealthRegistry::for_controller().await;
    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let app_state = Arc::new(AppState::new(health_registry.clone(), metrics));
    let listener = api::bind(config.api_port).await?;
    let api_handle = tokio::spawn(api::serve(listener, app_state, shutdown_tx.subscribe()));

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster: Arc<dyn ClusterAccessor> = Arc::new(KubeClusterAccessor::new(client));
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let reconciler = ReconcilerBuilder::new()
        .cluster(cluster.clone())
        .transport(transport)
        .clock(clock.clone())
        .health(health_registry.clone())
        .node_name(&config.node_name)
        .config(config.reconciler_config())
        .build()?;
    let reporter = StatusReporter::new(cluster.clone(), clock, logger.clone());
    let controller = ControllerLoop::new(
        cluster,
        reconciler,
        reporter,
        config.loop_config(),
        health_registry,
        logger.clone(),
    );

    let loop_handle = tokio::spawn(controller.run(shutdown_rx));
    logger.log_startup(CONTROLLER_VERSION, config.watch_namespace.as_deref());

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Reconciliation loop did not stop cleanly");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server did not stop cleanly"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
