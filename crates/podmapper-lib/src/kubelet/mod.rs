//! Kubelet pod-resources access
//!
//! This module provides:
//! - gRPC client for the kubelet pod-resources service over its Unix socket
//! - The provider seam the mapper fetches assignments through

mod client;

pub use client::{ClientConfig, KubeletClient, KubeletClientBuilder, KubeletConnection};

use crate::error::PodMapperError;
use crate::models::PodAssignment;
use async_trait::async_trait;

/// Default location of the kubelet pod-resources socket
pub const DEFAULT_SOCKET_PATH: &str = "/var/lib/kubelet/pod-resources/kubelet.sock";

/// Source of the node's current device assignments
#[async_trait]
pub trait PodResourcesProvider: Send + Sync {
    /// Fetch a complete snapshot of device assignments.
    ///
    /// Every call is independent; nothing is kept between calls.
    async fn fetch_assignments(&self) -> Result<Vec<PodAssignment>, PodMapperError>;
}
