//! gRPC client for the kubelet pod-resources service
//!
//! Connections are short-lived: one is opened per refresh and closed when the
//! [`KubeletConnection`] is dropped. Both the dial and the List call are
//! bounded by their own timeout and are never retried.

use super::{PodResourcesProvider, DEFAULT_SOCKET_PATH};
use crate::error::PodMapperError;
use crate::models::PodAssignment;
use crate::proto::{ListPodResourcesRequest, PodResourcesListerClient};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

/// Configuration for the pod-resources client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path of the kubelet pod-resources socket
    pub socket_path: PathBuf,
    /// Dial timeout
    pub connect_timeout: Duration,
    /// List call timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the kubelet pod-resources service
#[derive(Debug, Clone)]
pub struct KubeletClient {
    config: ClientConfig,
}

impl KubeletClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Dial the kubelet socket
    pub async fn connect(&self) -> Result<KubeletConnection, PodMapperError> {
        let path = self.config.socket_path.clone();
        let socket_path = path.clone();

        // The URI is a placeholder; the connector always dials the socket
        let endpoint = Endpoint::from_static("http://kubelet.sock");

        let connect = endpoint.connect_with_connector(service_fn(move |_: Uri| {
            UnixStream::connect(socket_path.clone())
        }));

        let channel = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| PodMapperError::ConnectTimeout {
                path: path.clone(),
                timeout: self.config.connect_timeout,
            })?
            .map_err(|source| PodMapperError::Connect {
                path: path.clone(),
                source,
            })?;

        debug!(socket = %path.display(), "Connected to kubelet pod-resources");

        Ok(KubeletConnection {
            client: PodResourcesListerClient::new(channel),
            path,
            request_timeout: self.config.request_timeout,
        })
    }
}

#[async_trait]
impl PodResourcesProvider for KubeletClient {
    async fn fetch_assignments(&self) -> Result<Vec<PodAssignment>, PodMapperError> {
        let mut connection = self.connect().await?;
        connection.list_assignments().await
    }
}

/// An open connection to the kubelet. Closed on drop.
#[derive(Debug)]
pub struct KubeletConnection {
    client: PodResourcesListerClient<Channel>,
    path: PathBuf,
    request_timeout: Duration,
}

impl KubeletConnection {
    /// List the current device assignments of every pod on the node
    pub async fn list_assignments(&mut self) -> Result<Vec<PodAssignment>, PodMapperError> {
        let request = tonic::Request::new(ListPodResourcesRequest {});

        let response = tokio::time::timeout(self.request_timeout, self.client.list(request))
            .await
            .map_err(|_| PodMapperError::ListTimeout {
                path: self.path.clone(),
                timeout: self.request_timeout,
            })?
            .map_err(|source| PodMapperError::List {
                path: self.path.clone(),
                source,
            })?;

        let pods = PodAssignment::from_response(response.into_inner());
        debug!(pods = pods.len(), "Listed pod resources");
        Ok(pods)
    }
}

/// Builder for KubeletClient configuration
pub struct KubeletClientBuilder {
    config: ClientConfig,
}

impl KubeletClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> KubeletClient {
        KubeletClient::new(self.config)
    }
}

impl Default for KubeletClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
