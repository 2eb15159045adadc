//! Drive operations against a MirrorProvider with an in-memory remote.

use std::sync::Arc;

use opendal::Operator;
use tempfile::TempDir;

use cirrus_core::config::MonitorConfig;
use cirrus_drive::{CloudDrive, CoordinationGate, DriveError, RootRelativePath};
use cirrus_provider::MirrorProvider;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn rel(s: &str) -> RootRelativePath {
    RootRelativePath::parse(s).unwrap()
}

async fn open_drive(tmp: &TempDir, remote: Operator) -> CloudDrive<MirrorProvider> {
    let provider = MirrorProvider::with_root(
        tmp.path().join("tree"),
        remote,
        "containers/test",
        MonitorConfig::default(),
    )
    .await
    .expect("provider");
    CloudDrive::new(provider, None).await.expect("drive")
}

#[tokio::test]
async fn write_then_read_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    let data = b"coordinated payload";
    drive.write_file(data, &rel("a.txt")).await.unwrap();
    assert_eq!(drive.read_file(&rel("a.txt")).await.unwrap(), data);
    drive.shutdown().await;
}

#[tokio::test]
async fn read_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    let err = drive.read_file(&rel("nope.txt")).await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)), "got {err}");
    drive.shutdown().await;
}

#[tokio::test]
async fn non_overwriting_write_fails_and_preserves_content() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    drive.write_file(b"abc", &rel("a.txt")).await.unwrap();

    let gate = CoordinationGate::new(drive.provider().clone(), drive.root().to_path_buf());
    let err = gate.write(&rel("a.txt"), b"xyz", false).await.unwrap_err();
    assert!(matches!(err, DriveError::AlreadyExists(_)), "got {err}");
    assert_eq!(drive.read_file(&rel("a.txt")).await.unwrap(), b"abc");
    drive.shutdown().await;
}

#[tokio::test]
async fn upload_never_overwrites() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    let source = tmp.path().join("outside.txt");
    tokio::fs::write(&source, b"fresh bytes").await.unwrap();

    drive.upload(&source, &rel("doc.txt")).await.unwrap();
    assert_eq!(drive.read_file(&rel("doc.txt")).await.unwrap(), b"fresh bytes");

    // Second upload to the same path fails and leaves the entry unmodified.
    tokio::fs::write(&source, b"replacement").await.unwrap();
    let err = drive.upload(&source, &rel("doc.txt")).await.unwrap_err();
    assert!(matches!(err, DriveError::AlreadyExists(_)), "got {err}");
    assert_eq!(drive.read_file(&rel("doc.txt")).await.unwrap(), b"fresh bytes");
    drive.shutdown().await;
}

#[tokio::test]
async fn upload_missing_source_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    let err = drive
        .upload(&tmp.path().join("missing.txt"), &rel("doc.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)), "got {err}");
    drive.shutdown().await;
}

#[tokio::test]
async fn remove_kind_must_match() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    drive.create_directory(&rel("dir")).await.unwrap();
    drive.write_file(b"f", &rel("file.txt")).await.unwrap();

    let err = drive.remove_file(&rel("dir")).await.unwrap_err();
    assert!(matches!(err, DriveError::TypeMismatch { .. }), "got {err}");
    let err = drive.remove_directory(&rel("file.txt")).await.unwrap_err();
    assert!(matches!(err, DriveError::TypeMismatch { .. }), "got {err}");

    // Matching kinds succeed.
    drive.remove_file(&rel("file.txt")).await.unwrap();
    drive.remove_directory(&rel("dir")).await.unwrap();
    assert!(!drive.file_exists(&rel("file.txt")).await.unwrap());
    assert!(!drive.directory_exists(&rel("dir")).await.unwrap());
    drive.shutdown().await;
}

#[tokio::test]
async fn remove_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    let err = drive.remove_file(&rel("ghost.txt")).await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)), "got {err}");
    drive.shutdown().await;
}

#[tokio::test]
async fn directory_scenario_kind_probes() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    drive.create_directory(&rel("Images")).await.unwrap();
    drive.create_directory(&rel("Images/Sub")).await.unwrap();

    assert!(drive.directory_exists(&rel("Images/Sub")).await.unwrap());
    // Kind mismatch is a false answer, not an error.
    assert!(!drive.file_exists(&rel("Images/Sub")).await.unwrap());

    // Idempotent re-creation, intermediates included.
    drive.create_directory(&rel("Images/Sub")).await.unwrap();
    drive.create_directory(&rel("a/b/c")).await.unwrap();
    assert!(drive.directory_exists(&rel("a/b/c")).await.unwrap());

    // A file in the way is an error.
    drive.write_file(b"x", &rel("taken")).await.unwrap();
    let err = drive.create_directory(&rel("taken")).await.unwrap_err();
    assert!(matches!(err, DriveError::TypeMismatch { .. }), "got {err}");
    drive.shutdown().await;
}

#[tokio::test]
async fn update_file_transforms_in_place() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    drive.write_file(b"count=1", &rel("state.txt")).await.unwrap();
    drive
        .update_file(&rel("state.txt"), |current| {
            assert_eq!(current, b"count=1");
            Ok(b"count=2".to_vec())
        })
        .await
        .unwrap();
    assert_eq!(drive.read_file(&rel("state.txt")).await.unwrap(), b"count=2");

    // A missing entry starts the transform from empty contents.
    drive
        .update_file(&rel("new.txt"), |current| {
            assert!(current.is_empty());
            Ok(b"seeded".to_vec())
        })
        .await
        .unwrap();
    assert_eq!(drive.read_file(&rel("new.txt")).await.unwrap(), b"seeded");
    drive.shutdown().await;
}

#[tokio::test]
async fn failed_transform_discards_and_surfaces_mutation_error() {
    let tmp = TempDir::new().unwrap();
    let drive = open_drive(&tmp, memory_operator()).await;

    drive.write_file(b"intact", &rel("state.txt")).await.unwrap();
    let err = drive
        .update_file(&rel("state.txt"), |_| anyhow::bail!("transform refused"))
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::Mutation(_)), "got {err}");
    assert_eq!(drive.read_file(&rel("state.txt")).await.unwrap(), b"intact");
    drive.shutdown().await;
}

#[tokio::test]
async fn remote_only_file_is_materialized_on_read() {
    let tmp = TempDir::new().unwrap();
    let remote = memory_operator();
    remote
        .write("containers/test/shared/report.pdf", vec![42u8; 1024])
        .await
        .unwrap();
    let drive = open_drive(&tmp, remote).await;

    // Visible before download, as a metadata-only probe.
    assert!(drive.file_exists(&rel("shared/report.pdf")).await.unwrap());

    let bytes = drive.read_file(&rel("shared/report.pdf")).await.unwrap();
    assert_eq!(bytes, vec![42u8; 1024]);
    drive.shutdown().await;
}

#[tokio::test]
async fn concurrent_writes_to_same_path_never_interleave() {
    let tmp = TempDir::new().unwrap();
    let drive = Arc::new(open_drive(&tmp, memory_operator()).await);

    let a = vec![b'A'; 64 * 1024];
    let b = vec![b'B'; 64 * 1024];

    let (ra, rb) = futures::future::join(
        drive.write_file(&a, &rel("contended.bin")),
        drive.write_file(&b, &rel("contended.bin")),
    )
    .await;
    ra.unwrap();
    rb.unwrap();

    let content = drive.read_file(&rel("contended.bin")).await.unwrap();
    assert!(
        content == a || content == b,
        "final content must be exactly one full payload"
    );
    drive.shutdown().await;
}

#[tokio::test]
async fn drive_scoped_to_subdirectory() {
    let tmp = TempDir::new().unwrap();
    let provider = MirrorProvider::with_root(
        tmp.path().join("tree"),
        memory_operator(),
        "containers/test",
        MonitorConfig::default(),
    )
    .await
    .unwrap();

    let drive = CloudDrive::new(provider, Some(rel("Documents")))
        .await
        .unwrap();
    assert!(drive.root().ends_with("Documents"));
    assert!(tmp.path().join("tree/Documents").is_dir());

    drive.write_file(b"scoped", &rel("note.md")).await.unwrap();
    assert!(tmp.path().join("tree/Documents/note.md").is_file());
    drive.shutdown().await;
}

#[tokio::test]
async fn invalid_components_are_rejected_before_io() {
    let err = RootRelativePath::root().appending("a/b").unwrap_err();
    assert!(matches!(err, DriveError::InvalidPath(_)));
}
