//! Blob store over the fs backend, rooted in a temp directory.

use keepsake_core::config::{StorageBackend, StorageConfig};
use keepsake_storage::{build_from_core_config, BlobStore, S3Credentials};

fn fs_config(root: &std::path::Path) -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Fs,
        root: root.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn blobs_persist_across_operators() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = fs_config(dir.path());

    let key = {
        let op = build_from_core_config(&cfg, &S3Credentials::default()).unwrap();
        let blobs = BlobStore::new(op);
        blobs.put("owner", "item-1", 1, vec![0xAB; 64]).await.unwrap()
    };

    assert!(dir.path().join("owner/item-1/1").exists());

    let op = build_from_core_config(&cfg, &S3Credentials::default()).unwrap();
    let blobs = BlobStore::new(op);
    blobs.check_health().await.unwrap();
    assert_eq!(blobs.get(&key).await.unwrap(), vec![0xAB; 64]);
}

#[test]
fn missing_blob_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let op = build_from_core_config(&fs_config(dir.path()), &S3Credentials::default()).unwrap();
    let blobs = BlobStore::new(op);

    let err = tokio_test::block_on(blobs.get("owner/ghost/1")).unwrap_err();
    assert!(matches!(err, keepsake_storage::BlobError::NotFound { .. }));
    assert!(!tokio_test::block_on(blobs.exists("owner/ghost/1")).unwrap());
}
