//! Observability infrastructure for the pod mapper
//!
//! Provides:
//! - Prometheus metrics (refresh latency, failures, attributed devices)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::attribution::AttributionTable;

/// Histogram buckets for refresh latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MapperMetricsInner> = OnceLock::new();

struct MapperMetricsInner {
    invocation_latency_seconds: Histogram,
    invocation_errors: IntCounter,
    kubelet_unavailable: IntCounter,
    attributed_devices: IntGauge,
}

impl MapperMetricsInner {
    fn new() -> Self {
        Self {
            invocation_latency_seconds: register_histogram!(
                "gpu_pod_mapper_invocation_latency_seconds",
                "Time spent fetching pod resources and building the attribution table",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register invocation_latency_seconds"),

            invocation_errors: register_int_counter!(
                "gpu_pod_mapper_invocation_errors_total",
                "Refreshes that failed to reach or query the kubelet"
            )
            .expect("Failed to register invocation_errors_total"),

            kubelet_unavailable: register_int_counter!(
                "gpu_pod_mapper_kubelet_unavailable_total",
                "Refreshes skipped because the pod-resources socket does not exist"
            )
            .expect("Failed to register kubelet_unavailable_total"),

            attributed_devices: register_int_gauge!(
                "gpu_pod_mapper_attributed_devices",
                "Device keys in the most recent attribution table"
            )
            .expect("Failed to register attributed_devices"),
        }
    }
}

/// Handle to the mapper's Prometheus metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MapperMetrics {
    _private: (),
}

impl Default for MapperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MapperMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MapperMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MapperMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_invocation_latency(&self, duration_secs: f64) {
        self.inner().invocation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_invocation_errors(&self) {
        self.inner().invocation_errors.inc();
    }

    pub fn inc_kubelet_unavailable(&self) {
        self.inner().kubelet_unavailable.inc();
    }

    pub fn set_attributed_devices(&self, count: i64) {
        self.inner().attributed_devices.set(count);
    }

    pub fn invocation_errors(&self) -> u64 {
        self.inner().invocation_errors.get()
    }

    pub fn kubelet_unavailable(&self) -> u64 {
        self.inner().kubelet_unavailable.get()
    }
}

/// Structured logger for mapper lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, socket_path: &str) {
        info!(
            event = "startup",
            node = %self.node_name,
            version = %version,
            socket = %socket_path,
            "Kubernetes GPU attribution enabled"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            node = %self.node_name,
            reason = %reason,
            "Pod mapper shutting down"
        );
    }

    /// Log a rebuilt table, one debug line per device
    pub fn log_table_rebuilt(&self, table: &AttributionTable) {
        info!(
            event = "attribution_rebuilt",
            node = %self.node_name,
            devices = table.len(),
            "Rebuilt GPU attribution table"
        );
        for (device, pod) in table.iter() {
            tracing::debug!(
                device = %device,
                pod = %pod.name,
                namespace = %pod.namespace,
                container = %pod.container,
                "Device attribution"
            );
        }
    }

    pub fn log_refresh_failed(&self, error: &dyn std::error::Error) {
        warn!(
            event = "attribution_failed",
            node = %self.node_name,
            error = %error,
            "Failed to rebuild GPU attribution table"
        );
    }
}
