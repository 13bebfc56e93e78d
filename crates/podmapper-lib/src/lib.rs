//! GPU pod mapper library
//!
//! This crate provides the core functionality for:
//! - Listing device assignments from the kubelet pod-resources service
//! - Normalizing device plugin ids into the keys GPU metrics use
//! - Building the device-to-pod attribution table
//! - Annotating metric records with pod, namespace and container
//! - Health tracking and observability

pub mod attribution;
pub mod error;
pub mod health;
pub mod kubelet;
pub mod mapper;
pub mod models;
pub mod normalize;
pub mod observability;
pub mod proto;
pub mod topology;

pub use attribution::AttributionTable;
pub use error::PodMapperError;
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse};
pub use kubelet::{KubeletClient, KubeletClientBuilder, PodResourcesProvider};
pub use mapper::{MapperConfig, MetricTransform, PodMapper, PodMapperBuilder};
pub use models::*;
pub use normalize::{normalize, DeviceIdEncoding, NormalizedId};
pub use observability::{MapperMetrics, StructuredLogger};
pub use topology::{DeviceTopology, GpuInfo, SystemInfo};
