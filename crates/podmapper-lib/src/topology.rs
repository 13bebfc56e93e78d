//! Device topology snapshot
//!
//! The device-enumeration side of the exporter produces a [`SystemInfo`]
//! describing every GPU on the node. The mapper only reads it to
//! translate kubelet device ids into the keys metric records already use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Prefix of MIG device UUIDs
pub const MIG_UUID_PREFIX: &str = "MIG-";

const GPU_UUID_PREFIX: &str = "GPU-";

/// Parsed legacy MIG UUID: `MIG-GPU-<uuid>/<gi>/<ci>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigDeviceUuid {
    /// Parent GPU UUID, including its `GPU-` prefix
    pub gpu_uuid: String,
    pub gpu_instance_id: u32,
    pub compute_instance_id: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigUuidError {
    #[error("unable to parse '{0}' as MIG device UUID")]
    Malformed(String),
    #[error("invalid {field} '{value}' in MIG device UUID")]
    InvalidIndex { field: &'static str, value: String },
}

/// Parse a MIG device UUID in the `MIG-GPU-<uuid>/<gi>/<ci>` form.
///
/// Newer drivers hand out opaque `MIG-<uuid>` ids; those are rejected here.
pub fn parse_mig_device_uuid(raw: &str) -> Result<MigDeviceUuid, MigUuidError> {
    let body = raw
        .strip_prefix(MIG_UUID_PREFIX)
        .ok_or_else(|| MigUuidError::Malformed(raw.to_string()))?;

    let mut tokens = body.splitn(3, '/');
    let (gpu_uuid, gi, ci) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(gpu), Some(gi), Some(ci)) if gpu.starts_with(GPU_UUID_PREFIX) => (gpu, gi, ci),
        _ => return Err(MigUuidError::Malformed(raw.to_string())),
    };

    let gpu_instance_id = gi.parse().map_err(|_| MigUuidError::InvalidIndex {
        field: "GPU instance id",
        value: gi.to_string(),
    })?;
    let compute_instance_id = ci.parse().map_err(|_| MigUuidError::InvalidIndex {
        field: "compute instance id",
        value: ci.to_string(),
    })?;

    Ok(MigDeviceUuid {
        gpu_uuid: gpu_uuid.to_string(),
        gpu_instance_id,
        compute_instance_id,
    })
}

/// Read-only view of the node's GPUs
pub trait DeviceTopology: Send + Sync {
    /// Key of a GPU instance, `<gpu index>-<gpu instance id>`, if the GPU is known
    fn instance_key(&self, gpu_uuid: &str, gpu_instance_id: u32) -> Option<String>;

    /// Native MIG UUID parser
    fn parse_mig_uuid(&self, raw: &str) -> Result<MigDeviceUuid, MigUuidError> {
        parse_mig_device_uuid(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// Driver index, e.g. 0 for nvidia0
    pub index: u32,
    pub uuid: String,
    #[serde(default)]
    pub device_name: String,
}

/// Snapshot of every GPU on the node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub gpus: Vec<GpuInfo>,
}

impl SystemInfo {
    pub fn new(gpus: Vec<GpuInfo>) -> Self {
        Self { gpus }
    }

    /// Load a snapshot written as JSON by the device enumerator
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology from {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Invalid topology in {}", path.display()))
    }

    pub fn gpu_by_uuid(&self, uuid: &str) -> Option<&GpuInfo> {
        self.gpus.iter().find(|gpu| gpu.uuid == uuid)
    }
}

impl DeviceTopology for SystemInfo {
    fn instance_key(&self, gpu_uuid: &str, gpu_instance_id: u32) -> Option<String> {
        self.gpu_by_uuid(gpu_uuid)
            .map(|gpu| format!("{}-{}", gpu.index, gpu_instance_id))
    }
}
