//! Device id normalization
//!
//! Device plugins report the devices they granted in different encodings:
//! - NVIDIA device plugin: GPU UUIDs and MIG UUIDs
//! - GKE device plugin: `nvidia0/gi1` for MIG instances, `nvidia0/vgpu3` for shared GPUs
//! - Other plugins: `<id>::<suffix>` compound ids
//!
//! Every encoding is translated to the key metric records are indexed by.
//! Encodings are tried in [`DeviceIdEncoding::PRIORITY`] order and the first
//! match wins.

use crate::topology::{DeviceTopology, MIG_UUID_PREFIX};
use tracing::debug;

/// Separator GKE uses for time-shared GPU replicas, e.g. "nvidia0/vgpu3"
pub const GKE_VIRTUAL_GPU_SEPARATOR: &str = "/vgpu";

/// Separator of compound device ids, e.g. "GPU-1234::2"
pub const COMPOUND_ID_SEPARATOR: &str = "::";

/// Canonical key for a device id, plus an optional second key the same
/// owner should be registered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedId {
    pub key: String,
    pub alias: Option<String>,
}

impl NormalizedId {
    fn single(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            alias: None,
        }
    }

    /// The key followed by the alias, if any
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str()).chain(self.alias.as_deref())
    }
}

/// Known device id encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdEncoding {
    /// `MIG-GPU-<uuid>/<gi>/<ci>` or opaque `MIG-<uuid>`
    MigUuid,
    /// `nvidia<N>/gi<M>`
    GkeMigInstance,
    /// `<device>/vgpu<K>`
    GkeVirtualGpu,
    /// `<id>::<suffix>`
    Compound,
    /// Anything else, used as-is
    Plain,
}

impl DeviceIdEncoding {
    /// Classification order. Earlier variants take precedence.
    pub const PRIORITY: [DeviceIdEncoding; 5] = [
        DeviceIdEncoding::MigUuid,
        DeviceIdEncoding::GkeMigInstance,
        DeviceIdEncoding::GkeVirtualGpu,
        DeviceIdEncoding::Compound,
        DeviceIdEncoding::Plain,
    ];

    /// First encoding in priority order that matches the id
    pub fn classify(raw: &str) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|encoding| encoding.matches(raw))
            .unwrap_or(DeviceIdEncoding::Plain)
    }

    /// Whether the id is in this encoding
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            DeviceIdEncoding::MigUuid => raw.starts_with(MIG_UUID_PREFIX),
            DeviceIdEncoding::GkeMigInstance => parse_gke_mig_instance(raw).is_some(),
            DeviceIdEncoding::GkeVirtualGpu => raw.contains(GKE_VIRTUAL_GPU_SEPARATOR),
            DeviceIdEncoding::Compound => raw.contains(COMPOUND_ID_SEPARATOR),
            DeviceIdEncoding::Plain => true,
        }
    }

    /// Translate an id already known to be in this encoding
    pub fn extract(&self, raw: &str, topology: &dyn DeviceTopology) -> NormalizedId {
        match self {
            DeviceIdEncoding::MigUuid => normalize_mig_uuid(raw, topology),
            DeviceIdEncoding::GkeMigInstance => match parse_gke_mig_instance(raw) {
                Some((gpu_index, gpu_instance_id)) => {
                    NormalizedId::single(format!("{}-{}", gpu_index, gpu_instance_id))
                }
                None => NormalizedId::single(raw),
            },
            DeviceIdEncoding::GkeVirtualGpu => {
                NormalizedId::single(prefix_before(raw, GKE_VIRTUAL_GPU_SEPARATOR))
            }
            DeviceIdEncoding::Compound => {
                NormalizedId::single(prefix_before(raw, COMPOUND_ID_SEPARATOR))
            }
            DeviceIdEncoding::Plain => NormalizedId::single(raw),
        }
    }
}

/// Translate a kubelet device id into the key metric records use
pub fn normalize(raw: &str, topology: &dyn DeviceTopology) -> NormalizedId {
    DeviceIdEncoding::classify(raw).extract(raw, topology)
}

fn normalize_mig_uuid(raw: &str, topology: &dyn DeviceTopology) -> NormalizedId {
    match topology.parse_mig_uuid(raw) {
        Ok(mig) => match topology.instance_key(&mig.gpu_uuid, mig.gpu_instance_id) {
            Some(instance_key) => NormalizedId {
                key: instance_key,
                alias: Some(mig.gpu_uuid),
            },
            None => {
                debug!(
                    device_id = %raw,
                    gpu_uuid = %mig.gpu_uuid,
                    "MIG parent GPU not in topology, keying by GPU UUID"
                );
                NormalizedId::single(mig.gpu_uuid)
            }
        },
        Err(e) => {
            debug!(device_id = %raw, error = %e, "Keying MIG device by bare UUID");
            NormalizedId::single(raw.strip_prefix(MIG_UUID_PREFIX).unwrap_or(raw))
        }
    }
}

/// Splits `nvidia<N>/gi<M>` into (N, M), digits kept verbatim
fn parse_gke_mig_instance(raw: &str) -> Option<(&str, &str)> {
    let (device, instance) = raw.strip_prefix("nvidia")?.split_once("/gi")?;
    if is_ascii_number(device) && is_ascii_number(instance) {
        Some((device, instance))
    } else {
        None
    }
}

fn is_ascii_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn prefix_before<'a>(raw: &'a str, separator: &str) -> &'a str {
    raw.split_once(separator).map_or(raw, |(prefix, _)| prefix)
}
