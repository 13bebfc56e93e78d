//! Pod attribution for GPU metrics
//!
//! [`PodMapper`] looks up which pod, namespace and container owns each GPU
//! and writes that into the attributes of every metric record. Each call
//! rebuilds the attribution from the kubelet; nothing is cached.

use crate::attribution::AttributionTable;
use crate::error::PodMapperError;
use crate::kubelet::{ClientConfig, KubeletClient, PodResourcesProvider};
use crate::models::{AttributeNames, GpuIdType, MetricRecord};
use crate::observability::MapperMetrics;
use crate::topology::DeviceTopology;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A processing step applied to each batch of metrics
#[async_trait]
pub trait MetricTransform: Send + Sync {
    /// Mutate the metric batch in place
    async fn process(
        &self,
        metrics: &mut [Vec<MetricRecord>],
        topology: &dyn DeviceTopology,
    ) -> Result<(), PodMapperError>;

    fn name(&self) -> &'static str;
}

/// Configuration for the pod mapper
#[derive(Debug, Clone, Default)]
pub struct MapperConfig {
    /// Kubelet pod-resources client settings
    pub client: ClientConfig,
    /// Which device id metric records are keyed by
    pub gpu_id_type: GpuIdType,
    /// Write `pod_name`/`pod_namespace`/`container_name` instead of `pod`/`namespace`/`container`
    pub use_old_namespace: bool,
}

/// Attaches Kubernetes pod attribution to GPU metric records
pub struct PodMapper<P = KubeletClient> {
    config: MapperConfig,
    provider: P,
    metrics: MapperMetrics,
}

impl PodMapper<KubeletClient> {
    /// Create a mapper that queries the kubelet socket from the configuration
    pub fn new(config: MapperConfig) -> Self {
        let provider = KubeletClient::new(config.client.clone());
        Self::with_provider(config, provider)
    }
}

impl<P: PodResourcesProvider> PodMapper<P> {
    /// Create a mapper that reads assignments from a custom provider
    pub fn with_provider(config: MapperConfig, provider: P) -> Self {
        info!(
            socket = %config.client.socket_path.display(),
            gpu_id_type = %config.gpu_id_type,
            "Kubernetes metrics collection enabled"
        );
        Self {
            config,
            provider,
            metrics: MapperMetrics::new(),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Build the current attribution table.
    ///
    /// Returns `Ok(None)` when the pod-resources socket does not exist, which
    /// means attribution is unavailable on this node.
    pub async fn attribution_table(
        &self,
        topology: &dyn DeviceTopology,
    ) -> Result<Option<AttributionTable>, PodMapperError> {
        if !self.endpoint_present().await {
            info!(
                socket = %self.config.client.socket_path.display(),
                "No Kubelet socket, ignoring"
            );
            self.metrics.inc_kubelet_unavailable();
            return Ok(None);
        }

        let start = Instant::now();
        let pods = match self.provider.fetch_assignments().await {
            Ok(pods) => pods,
            Err(e) => {
                self.metrics.inc_invocation_errors();
                return Err(e);
            }
        };

        let table = AttributionTable::build(&pods, topology);

        self.metrics
            .observe_invocation_latency(start.elapsed().as_secs_f64());
        self.metrics.set_attributed_devices(table.len() as i64);
        debug!(
            pods = pods.len(),
            devices = table.len(),
            "Built GPU attribution table"
        );

        Ok(Some(table))
    }

    /// Write pod attribution into every record.
    ///
    /// Records whose device has no owner get empty values. On error no record
    /// is modified.
    pub async fn process(
        &self,
        metrics: &mut [Vec<MetricRecord>],
        topology: &dyn DeviceTopology,
    ) -> Result<(), PodMapperError> {
        let Some(table) = self.attribution_table(topology).await? else {
            return Ok(());
        };

        annotate(
            metrics,
            &table,
            self.config.gpu_id_type,
            AttributeNames::select(self.config.use_old_namespace),
        );

        Ok(())
    }

    /// Only a missing path disables attribution; other stat failures are
    /// left for the dial to report.
    async fn endpoint_present(&self) -> bool {
        match tokio::fs::metadata(&self.config.client.socket_path).await {
            Ok(_) => true,
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        }
    }
}

#[async_trait]
impl<P: PodResourcesProvider> MetricTransform for PodMapper<P> {
    async fn process(
        &self,
        metrics: &mut [Vec<MetricRecord>],
        topology: &dyn DeviceTopology,
    ) -> Result<(), PodMapperError> {
        PodMapper::<P>::process(self, metrics, topology).await
    }

    fn name(&self) -> &'static str {
        "podMapper"
    }
}

/// Write attribution from `table` into each record
pub fn annotate(
    metrics: &mut [Vec<MetricRecord>],
    table: &AttributionTable,
    gpu_id_type: GpuIdType,
    names: AttributeNames,
) {
    for device in metrics.iter_mut() {
        for record in device.iter_mut() {
            let key = record.device_key(gpu_id_type);
            record.set_pod_attribution(names, table.get(&key));
        }
    }
}

/// Builder for PodMapper configuration
pub struct PodMapperBuilder {
    config: MapperConfig,
}

impl PodMapperBuilder {
    pub fn new() -> Self {
        Self {
            config: MapperConfig::default(),
        }
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.client.socket_path = path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.client.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.client.request_timeout = timeout;
        self
    }

    pub fn gpu_id_type(mut self, id_type: GpuIdType) -> Self {
        self.config.gpu_id_type = id_type;
        self
    }

    pub fn use_old_namespace(mut self, enabled: bool) -> Self {
        self.config.use_old_namespace = enabled;
        self
    }

    pub fn config(self) -> MapperConfig {
        self.config
    }

    pub fn build(self) -> PodMapper<KubeletClient> {
        PodMapper::new(self.config)
    }

    pub fn build_with_provider<P: PodResourcesProvider>(self, provider: P) -> PodMapper<P> {
        PodMapper::with_provider(self.config, provider)
    }
}

impl Default for PodMapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
