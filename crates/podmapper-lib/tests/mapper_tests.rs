//! End-to-end tests for pod attribution of GPU metrics
//!
//! The kubelet is replaced by an in-memory provider; the socket path is a
//! temp file so the endpoint probe sees it as present.

use async_trait::async_trait;
use podmapper_lib::{
    AttributionTable, ContainerAssignment, DeviceGrouping, GpuIdType, GpuInfo, MetricRecord,
    MetricTransform, PodAssignment, PodMapperBuilder, PodMapperError, PodResourcesProvider,
    SystemInfo,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Provider returning a fixed response
struct FakeKubelet {
    response: Result<Vec<PodAssignment>, String>,
    calls: Arc<AtomicUsize>,
}

impl FakeKubelet {
    fn with_pods(pods: Vec<PodAssignment>) -> Self {
        Self {
            response: Ok(pods),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PodResourcesProvider for FakeKubelet {
    async fn fetch_assignments(&self) -> Result<Vec<PodAssignment>, PodMapperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .map_err(|message| PodMapperError::List {
                path: PathBuf::from("/fake/kubelet.sock"),
                source: tonic::Status::unavailable(message),
            })
    }
}

/// Temp dir holding a stand-in socket file
fn socket_dir() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kubelet.sock");
    std::fs::write(&path, b"").unwrap();
    (dir, path)
}

fn gpu_pod(
    name: &str,
    namespace: &str,
    container: &str,
    resource: &str,
    ids: &[&str],
) -> PodAssignment {
    PodAssignment {
        name: name.to_string(),
        namespace: namespace.to_string(),
        containers: vec![ContainerAssignment {
            name: container.to_string(),
            devices: vec![DeviceGrouping {
                resource_name: resource.to_string(),
                device_ids: ids.iter().map(|s| s.to_string()).collect(),
            }],
        }],
    }
}

fn record_for(uuid: &str) -> MetricRecord {
    MetricRecord {
        counter: "DCGM_FI_DEV_GPU_UTIL".to_string(),
        value: "42".to_string(),
        gpu: "0".to_string(),
        gpu_uuid: uuid.to_string(),
        gpu_device: "nvidia0".to_string(),
        ..Default::default()
    }
}

fn topology() -> SystemInfo {
    SystemInfo::new(vec![
        GpuInfo {
            index: 0,
            uuid: "GPU-1234".to_string(),
            device_name: "nvidia0".to_string(),
        },
        GpuInfo {
            index: 1,
            uuid: "GPU-mig".to_string(),
            device_name: "nvidia1".to_string(),
        },
    ])
}

#[tokio::test]
async fn test_missing_socket_leaves_metrics_untouched() {
    let dir = TempDir::new().unwrap();
    let kubelet = FakeKubelet::with_pods(vec![gpu_pod(
        "p",
        "ns",
        "c",
        "nvidia.com/gpu",
        &["GPU-1234"],
    )]);
    let calls = kubelet.calls.clone();

    let mapper = PodMapperBuilder::new()
        .socket_path(dir.path().join("kubelet.sock"))
        .build_with_provider(kubelet);

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    let before = metrics.clone();

    mapper.process(&mut metrics, &topology()).await.unwrap();

    assert_eq!(metrics, before);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_attributes_owned_and_unowned_devices() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "trainer-0",
            "ml",
            "cuda",
            "nvidia.com/gpu",
            &["GPU-1234"],
        )]));

    let mut metrics = vec![vec![record_for("GPU-1234")], vec![record_for("GPU-9999")]];

    mapper.process(&mut metrics, &topology()).await.unwrap();

    let owned = &metrics[0][0].attributes;
    assert_eq!(owned["pod"], "trainer-0");
    assert_eq!(owned["namespace"], "ml");
    assert_eq!(owned["container"], "cuda");

    let unowned = &metrics[1][0].attributes;
    assert_eq!(unowned["pod"], "");
    assert_eq!(unowned["namespace"], "");
    assert_eq!(unowned["container"], "");

    // identity and value fields are left alone
    assert_eq!(metrics[0][0].value, "42");
    assert_eq!(metrics[1][0].gpu_uuid, "GPU-9999");
}

#[tokio::test]
async fn test_legacy_attribute_names() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .use_old_namespace(true)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "trainer-0",
            "ml",
            "cuda",
            "nvidia.com/gpu",
            &["GPU-1234"],
        )]));

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    mapper.process(&mut metrics, &topology()).await.unwrap();

    let attributes = &metrics[0][0].attributes;
    assert_eq!(attributes["pod_name"], "trainer-0");
    assert_eq!(attributes["pod_namespace"], "ml");
    assert_eq!(attributes["container_name"], "cuda");
    assert!(!attributes.contains_key("pod"));
    assert!(!attributes.contains_key("namespace"));
    assert!(!attributes.contains_key("container"));
}

#[tokio::test]
async fn test_device_name_keys_match_gke_shared_gpus() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .gpu_id_type(GpuIdType::DeviceName)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "shared",
            "default",
            "app",
            "nvidia.com/gpu",
            &["nvidia0/vgpu2"],
        )]));

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    mapper.process(&mut metrics, &topology()).await.unwrap();

    assert_eq!(metrics[0][0].attributes["pod"], "shared");
}

#[tokio::test]
async fn test_mig_records_use_instance_key() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "mig-job",
            "batch",
            "worker",
            "nvidia.com/mig-1g.5gb",
            &["MIG-GPU-mig/5/0"],
        )]));

    let mig_record = MetricRecord {
        gpu: "1".to_string(),
        gpu_uuid: "GPU-mig".to_string(),
        mig_profile: "1g.5gb".to_string(),
        gpu_instance_id: "5".to_string(),
        ..Default::default()
    };
    let whole_gpu_record = record_for("GPU-mig");
    let mut metrics = vec![vec![mig_record, whole_gpu_record]];

    mapper.process(&mut metrics, &topology()).await.unwrap();

    assert_eq!(metrics[0][0].attributes["pod"], "mig-job");
    // the parent GPU uuid is registered too
    assert_eq!(metrics[0][1].attributes["pod"], "mig-job");
}

#[tokio::test]
async fn test_non_gpu_resources_do_not_attribute() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "impostor",
            "default",
            "app",
            "example.com/accelerator",
            &["GPU-1234"],
        )]));

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    mapper.process(&mut metrics, &topology()).await.unwrap();

    assert_eq!(metrics[0][0].attributes["pod"], "");
}

#[tokio::test]
async fn test_list_failure_propagates_without_mutation() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(FakeKubelet::failing("kubelet restarting"));

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    let before = metrics.clone();

    let err = mapper.process(&mut metrics, &topology()).await.unwrap_err();

    assert!(matches!(err, PodMapperError::List { .. }));
    assert!(err.to_string().contains("kubelet restarting"));
    assert_eq!(metrics, before);
}

#[tokio::test]
async fn test_unreachable_kubelet_socket_is_an_error() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .connect_timeout(std::time::Duration::from_secs(2))
        .build();

    let mut metrics = vec![vec![record_for("GPU-1234")]];
    let err = mapper.process(&mut metrics, &topology()).await.unwrap_err();

    assert!(matches!(err, PodMapperError::Connect { .. }));
    assert!(metrics[0][0].attributes.is_empty());
}

#[tokio::test]
async fn test_attribution_table_is_rebuilt_every_call() {
    let (_dir, socket) = socket_dir();
    let kubelet = FakeKubelet::with_pods(vec![gpu_pod(
        "p",
        "ns",
        "c",
        "nvidia.com/gpu",
        &["GPU-1234"],
    )]);
    let calls = kubelet.calls.clone();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(kubelet);

    let first: AttributionTable = mapper.attribution_table(&topology()).await.unwrap().unwrap();
    let second = mapper.attribution_table(&topology()).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_runs_as_metric_transform() {
    let (_dir, socket) = socket_dir();
    let mapper = PodMapperBuilder::new()
        .socket_path(&socket)
        .build_with_provider(FakeKubelet::with_pods(vec![gpu_pod(
            "p",
            "ns",
            "c",
            "nvidia.com/gpu",
            &["GPU-1234"],
        )]));

    let transforms: Vec<Box<dyn MetricTransform>> = vec![Box::new(mapper)];
    let mut metrics = vec![vec![record_for("GPU-1234")]];

    for transform in &transforms {
        assert_eq!(transform.name(), "podMapper");
        transform.process(&mut metrics, &topology()).await.unwrap();
    }

    assert_eq!(metrics[0][0].attributes["pod"], "p");
}
