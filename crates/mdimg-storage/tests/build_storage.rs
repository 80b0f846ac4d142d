use std::path::PathBuf;

use mdimg_core::{StorageError, StorageSettings};
use mdimg_storage::build_storage;

#[tokio::test]
async fn local_backend_serves_from_base_url() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings::Local {
        base_dir: dir.path().join("objects"),
        base_url: "https://static.example.com/".to_string(),
    };
    let storage = build_storage(&settings).unwrap();

    let source = dir.path().join("image_0.png");
    std::fs::write(&source, b"\x89PNG fake").unwrap();
    let url = storage
        .upload(&source, "images/post-1/image_0.png", "image/png")
        .await
        .unwrap();

    assert_eq!(url, "https://static.example.com/images/post-1/image_0.png");
    assert_eq!(url, storage.public_url("images/post-1/image_0.png"));
    assert!(dir.path().join("objects/images/post-1/image_0.png").exists());
}

#[tokio::test]
async fn local_upload_of_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let storage = build_storage(&StorageSettings::Local {
        base_dir: dir.path().to_path_buf(),
        base_url: "/storage".to_string(),
    })
    .unwrap();

    let err = storage
        .upload(&PathBuf::from("/nonexistent/x.png"), "a.png", "image/png")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
}

#[test]
fn s3_backend_uses_public_url_when_set() {
    let storage = build_storage(&StorageSettings::S3Compatible {
        endpoint: "https://acct.r2.cloudflarestorage.com".to_string(),
        bucket: "images".to_string(),
        region: "auto".to_string(),
        access_key_id: "AKID".to_string(),
        secret_access_key: "secret".to_string(),
        public_url: Some("https://cdn.example.com".to_string()),
    })
    .unwrap();
    assert_eq!(
        storage.public_url("images/t/image_1.jpg"),
        "https://cdn.example.com/images/t/image_1.jpg"
    );
}

#[test]
fn s3_backend_rejects_bad_endpoint() {
    let result = build_storage(&StorageSettings::S3Compatible {
        endpoint: "::not a url::".to_string(),
        bucket: "images".to_string(),
        region: "auto".to_string(),
        access_key_id: "AKID".to_string(),
        secret_access_key: "secret".to_string(),
        public_url: None,
    });
    assert!(matches!(result, Err(StorageError::Configuration(_))));
}
