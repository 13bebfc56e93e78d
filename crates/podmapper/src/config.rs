//! Agent configuration

use anyhow::{Context, Result};
use podmapper_lib::{kubelet::DEFAULT_SOCKET_PATH, GpuIdType, MapperConfig, PodMapperBuilder};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/attributions
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Kubelet pod-resources socket
    #[serde(default = "default_kubelet_socket")]
    pub kubelet_socket: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How often the attribution table is rebuilt
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Device id GPU metrics are keyed by: "uid" or "device-name"
    #[serde(default)]
    pub gpu_id_type: GpuIdType,

    /// Use pod_name/pod_namespace/container_name attribute names
    #[serde(default)]
    pub use_old_namespace: bool,

    /// JSON snapshot of the node's GPUs written by the device enumerator
    #[serde(default = "default_topology_path")]
    pub topology_path: PathBuf,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_kubelet_socket() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_topology_path() -> PathBuf {
    PathBuf::from("/run/gpu-pod-mapper/topology.json")
}

impl AgentConfig {
    /// Load configuration from an optional file and `PODMAPPER_*` environment variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var("PODMAPPER_CONFIG_FILE") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("PODMAPPER").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn mapper_config(&self) -> MapperConfig {
        PodMapperBuilder::new()
            .socket_path(&self.kubelet_socket)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .gpu_id_type(self.gpu_id_type)
            .use_old_namespace(self.use_old_namespace)
            .config()
    }
}
