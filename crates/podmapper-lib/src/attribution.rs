//! Device-to-pod attribution table

use crate::models::{is_gpu_resource, PodAssignment, PodInfo};
use crate::normalize::normalize;
use crate::topology::DeviceTopology;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Maps a device key to the pod that owns the device.
///
/// Rebuilt from scratch on every refresh. If the kubelet reports the same key
/// for two containers, the one listed last wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributionTable {
    entries: HashMap<String, PodInfo>,
}

impl AttributionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from kubelet assignments, ignoring non-GPU resources
    pub fn build(pods: &[PodAssignment], topology: &dyn DeviceTopology) -> Self {
        let mut table = Self::new();

        for pod in pods {
            for container in &pod.containers {
                for grouping in &container.devices {
                    if !is_gpu_resource(&grouping.resource_name) {
                        continue;
                    }

                    let pod_info = PodInfo {
                        name: pod.name.clone(),
                        namespace: pod.namespace.clone(),
                        container: container.name.clone(),
                    };

                    for device_id in &grouping.device_ids {
                        let normalized = normalize(device_id, topology);
                        for key in normalized.keys() {
                            table.insert(key, pod_info.clone());
                        }
                    }
                }
            }
        }

        table
    }

    /// Insert an attribution, returning the one it replaced
    pub fn insert(&mut self, key: impl Into<String>, pod: PodInfo) -> Option<PodInfo> {
        let key = key.into();
        let previous = self.entries.insert(key.clone(), pod);
        if let Some(prev) = &previous {
            debug!(
                device = %key,
                previous_pod = %prev.name,
                previous_namespace = %prev.namespace,
                "Device reported for more than one container, keeping the last"
            );
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<&PodInfo> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PodInfo)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
