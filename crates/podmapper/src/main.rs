//! GPU Pod Mapper - device-to-pod attribution sidecar
//!
//! Runs as a DaemonSet next to the GPU exporter. Periodically rebuilds the
//! table of which pod owns each GPU from the kubelet pod-resources API and
//! serves it together with health and Prometheus metrics.

use anyhow::Result;
use podmapper_lib::{
    health::{components, HealthRegistry},
    ComponentHealth, MapperMetrics, PodMapper, StructuredLogger, SystemInfo,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting gpu-pod-mapper");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        gpu_id_type = %config.gpu_id_type,
        refresh_interval_secs = config.refresh_interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::KUBELET).await;
    health_registry.register(components::TOPOLOGY).await;

    let metrics = MapperMetrics::new();

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, &config.kubelet_socket.display().to_string());

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    let mapper = PodMapper::new(config.mapper_config());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            return;
        }
        let _ = shutdown_tx.send(());
    });

    run_refresh_loop(&mapper, &config, &app_state, &logger, shutdown_rx).await;
    logger.log_shutdown("SIGINT received");

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// Refresh on every tick until a shutdown signal arrives. A signal sent
/// while a refresh is running is picked up once it completes.
async fn run_refresh_loop(
    mapper: &PodMapper,
    config: &config::AgentConfig,
    state: &api::AppState,
    logger: &StructuredLogger,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(config.refresh_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh(mapper, config, state, logger).await;
            }
            Ok(()) = shutdown.recv() => {
                break;
            }
        }
    }
}

/// Rebuild the attribution table once and publish the outcome
async fn refresh(
    mapper: &PodMapper,
    config: &config::AgentConfig,
    state: &api::AppState,
    logger: &StructuredLogger,
) {
    // The enumerator rewrites the snapshot when devices change
    let topology = match SystemInfo::from_json_file(&config.topology_path) {
        Ok(topology) => {
            state
                .health_registry
                .update(components::TOPOLOGY, ComponentHealth::healthy())
                .await;
            topology
        }
        Err(e) => {
            state
                .health_registry
                .update(components::TOPOLOGY, ComponentHealth::unhealthy(format!("{:#}", e)))
                .await;
            logger.log_refresh_failed(&*e);
            return;
        }
    };

    match mapper.attribution_table(&topology).await {
        Ok(table) => {
            state.health_registry.record_refresh(Ok(table.as_ref())).await;
            if let Some(table) = &table {
                logger.log_table_rebuilt(table);
            }
            state.set_attributions(table).await;
        }
        Err(e) => {
            state.health_registry.record_refresh(Err(&e)).await;
            logger.log_refresh_failed(&e);
            state.set_attributions(None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podmapper_lib::ComponentStatus;
    use std::time::Duration;

    fn test_config() -> config::AgentConfig {
        ::config::Config::builder()
            .set_override("topology_path", "/nonexistent/gpu-pod-mapper/topology.json")
            .unwrap()
            .set_override("kubelet_socket", "/nonexistent/gpu-pod-mapper/kubelet.sock")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_loop_stops_on_signal_sent_before_it_polls() {
        let config = test_config();
        let state = api::AppState::new(HealthRegistry::new(), MapperMetrics::new());
        let logger = StructuredLogger::new("test-node");
        let mapper = PodMapper::new(config.mapper_config());

        let (tx, rx) = broadcast::channel(1);
        // Queued before the loop runs, as when SIGINT lands mid-refresh
        tx.send(()).unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_refresh_loop(&mapper, &config, &state, &logger, rx),
        )
        .await
        .expect("refresh loop did not stop");
    }

    #[tokio::test]
    async fn test_refresh_marks_missing_topology_unhealthy() {
        let config = test_config();
        let state = api::AppState::new(HealthRegistry::new(), MapperMetrics::new());
        let logger = StructuredLogger::new("test-node");
        let mapper = PodMapper::new(config.mapper_config());

        refresh(&mapper, &config, &state, &logger).await;

        let health = state.health_registry.health().await;
        assert_eq!(
            health.components[components::TOPOLOGY].status,
            ComponentStatus::Unhealthy
        );
    }
}
