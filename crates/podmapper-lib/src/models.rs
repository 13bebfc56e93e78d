//! Core data models for the pod mapper

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::proto::ListPodResourcesResponse;

/// Resource name the NVIDIA device plugin advertises for whole GPUs
pub const NVIDIA_RESOURCE_NAME: &str = "nvidia.com/gpu";

/// MIG resources are advertised per profile, e.g. "nvidia.com/mig-1g.5gb"
pub const NVIDIA_MIG_RESOURCE_PREFIX: &str = "nvidia.com/mig-";

/// Returns true if the resource name belongs to the NVIDIA GPU plugins
pub fn is_gpu_resource(resource_name: &str) -> bool {
    resource_name == NVIDIA_RESOURCE_NAME || resource_name.starts_with(NVIDIA_MIG_RESOURCE_PREFIX)
}

/// Which device identifier metric records are keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GpuIdType {
    /// GPU UUID, e.g. "GPU-b8ea3855-276c-c9cb-b366-c6fa655957c5"
    #[default]
    #[serde(rename = "uid")]
    Uid,
    /// Device name, e.g. "nvidia0"
    #[serde(rename = "device-name")]
    DeviceName,
}

impl GpuIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuIdType::Uid => "uid",
            GpuIdType::DeviceName => "device-name",
        }
    }
}

impl fmt::Display for GpuIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuIdType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uid" => Ok(GpuIdType::Uid),
            "device-name" => Ok(GpuIdType::DeviceName),
            other => Err(anyhow::anyhow!(
                "unsupported GPU id type '{}', expected 'uid' or 'device-name'",
                other
            )),
        }
    }
}

/// Attribute names written into metric records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeNames {
    pub pod: &'static str,
    pub namespace: &'static str,
    pub container: &'static str,
}

impl AttributeNames {
    pub const CURRENT: AttributeNames = AttributeNames {
        pod: "pod",
        namespace: "namespace",
        container: "container",
    };

    pub const LEGACY: AttributeNames = AttributeNames {
        pod: "pod_name",
        namespace: "pod_namespace",
        container: "container_name",
    };

    pub fn select(use_old_namespace: bool) -> Self {
        if use_old_namespace {
            Self::LEGACY
        } else {
            Self::CURRENT
        }
    }
}

/// Owner of a device as reported by the kubelet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub container: String,
}

/// One measurement for one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub counter: String,
    pub value: String,
    /// GPU index as assigned by the driver
    pub gpu: String,
    pub gpu_uuid: String,
    pub gpu_device: String,
    pub gpu_model_name: String,
    /// Empty unless the record describes a MIG instance
    pub mig_profile: String,
    pub gpu_instance_id: String,
    pub hostname: String,
    pub labels: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
}

impl MetricRecord {
    /// Key this record is indexed by in the attribution table.
    ///
    /// MIG instances are always keyed as `<gpu>-<gpu instance id>`, regardless
    /// of the configured id type.
    pub fn device_key(&self, id_type: GpuIdType) -> String {
        if !self.mig_profile.is_empty() {
            return format!("{}-{}", self.gpu, self.gpu_instance_id);
        }

        match id_type {
            GpuIdType::Uid => self.gpu_uuid.clone(),
            GpuIdType::DeviceName => self.gpu_device.clone(),
        }
    }

    /// Write pod attribution using the given attribute names
    pub fn set_pod_attribution(&mut self, names: AttributeNames, pod: Option<&PodInfo>) {
        let (name, namespace, container) = match pod {
            Some(p) => (p.name.clone(), p.namespace.clone(), p.container.clone()),
            None => (String::new(), String::new(), String::new()),
        };

        self.attributes.insert(names.pod.to_string(), name);
        self.attributes
            .insert(names.namespace.to_string(), namespace);
        self.attributes
            .insert(names.container.to_string(), container);
    }
}

/// Devices of one resource type granted to a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceGrouping {
    pub resource_name: String,
    pub device_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAssignment {
    pub name: String,
    pub devices: Vec<DeviceGrouping>,
}

/// Device assignments of one pod, as listed by the kubelet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodAssignment {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerAssignment>,
}

impl PodAssignment {
    /// Convert a kubelet List response into assignments
    pub fn from_response(response: ListPodResourcesResponse) -> Vec<PodAssignment> {
        response
            .pod_resources
            .into_iter()
            .map(|pod| PodAssignment {
                name: pod.name,
                namespace: pod.namespace,
                containers: pod
                    .containers
                    .into_iter()
                    .map(|container| ContainerAssignment {
                        name: container.name,
                        devices: container
                            .devices
                            .into_iter()
                            .map(|d| DeviceGrouping {
                                resource_name: d.resource_name,
                                device_ids: d.device_ids,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}
