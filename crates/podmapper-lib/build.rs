//! Build script for generating protobuf code
//!
//! Generates the kubelet pod-resources client when the `proto-gen` feature is
//! enabled. Without it the checked-in stubs in `src/proto` are used.

use std::path::PathBuf;
use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Re-run if proto files change
    println!("cargo:rerun-if-changed=proto/podresources/v1alpha1/api.proto");

    if std::env::var_os("CARGO_FEATURE_PROTO_GEN").is_none() {
        return Ok(());
    }

    // Check if protoc is available
    let protoc_available =
        std::env::var("PROTOC").is_ok() || Command::new("protoc").arg("--version").output().is_ok();

    if !protoc_available {
        println!("cargo:warning=protoc not found, skipping proto generation");
        println!("cargo:warning=Install protoc or set PROTOC env var to generate proto code");
        return Ok(());
    }

    // Output directory for generated code
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    // The kubelet serves pod-resources; we only ever call it
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .out_dir(&out_dir)
        .compile(&["proto/podresources/v1alpha1/api.proto"], &["proto"])?;

    Ok(())
}
