//! Errors that abort a mapping refresh

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the kubelet pod-resources endpoint.
///
/// A missing endpoint is not an error; the mapper skips attribution instead.
#[derive(Debug, Error)]
pub enum PodMapperError {
    #[error("failure connecting to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("timed out after {timeout:?} connecting to {}", .path.display())]
    ConnectTimeout { path: PathBuf, timeout: Duration },

    #[error("failure getting pod resources from {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: tonic::Status,
    },

    #[error("timed out after {timeout:?} getting pod resources from {}", .path.display())]
    ListTimeout { path: PathBuf, timeout: Duration },
}

impl PodMapperError {
    /// Endpoint the failing call was made against
    pub fn path(&self) -> &std::path::Path {
        match self {
            PodMapperError::Connect { path, .. }
            | PodMapperError::ConnectTimeout { path, .. }
            | PodMapperError::List { path, .. }
            | PodMapperError::ListTimeout { path, .. } => path,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PodMapperError::Connect { .. } | PodMapperError::ConnectTimeout { .. } => "connect",
            PodMapperError::List { .. } | PodMapperError::ListTimeout { .. } => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_error_mentions_endpoint() {
        let err = PodMapperError::List {
            path: PathBuf::from("/var/lib/kubelet/pod-resources/kubelet.sock"),
            source: tonic::Status::unavailable("kubelet restarting"),
        };

        let message = err.to_string();
        assert!(message.contains("/var/lib/kubelet/pod-resources/kubelet.sock"));
        assert!(message.contains("kubelet restarting"));
        assert_eq!(err.kind(), "list");
    }

    #[test]
    fn test_timeout_kind() {
        let err = PodMapperError::ConnectTimeout {
            path: PathBuf::from("/tmp/kubelet.sock"),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.kind(), "connect");
        assert_eq!(err.path(), std::path::Path::new("/tmp/kubelet.sock"));
    }
}
