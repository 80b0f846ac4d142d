//! Local directory storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mdimg_core::{StorageError, StoragePort};

/// Stores objects as files under `base_dir`, served from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File path for `key`. Keys may not escape `base_dir`.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::Io(format!("invalid object key '{key}'")));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl StoragePort for LocalStorage {
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(format!("create {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            StorageError::Io(format!(
                "copy {} to {}: {e}",
                local_path.display(),
                target.display()
            ))
        })?;

        tracing::debug!(
            target: "mdimg.storage",
            backend = "local",
            key = %key,
            content_type,
            path = %target.display(),
            "Stored object"
        );
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let target = self.object_path(key)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                tracing::debug!(target: "mdimg.storage", backend = "local", key = %key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(format!("remove {}: {e}", target.display()))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_overwrites_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("storage"), "/storage/");
        let source = dir.path().join("staged.png");

        std::fs::write(&source, b"first").unwrap();
        let url = storage
            .upload(&source, "images/job/image_0.png", "image/png")
            .await
            .unwrap();
        assert_eq!(url, "/storage/images/job/image_0.png");

        std::fs::write(&source, b"second").unwrap();
        storage
            .upload(&source, "images/job/image_0.png", "image/png")
            .await
            .unwrap();
        let stored = dir.path().join("storage/images/job/image_0.png");
        assert_eq!(std::fs::read(&stored).unwrap(), b"second");

        storage.delete("images/job/image_0.png").await.unwrap();
        assert!(!stored.exists());
        storage.delete("images/job/image_0.png").await.unwrap();
    }

    #[test]
    fn test_keys_cannot_escape_base_dir() {
        let storage = LocalStorage::new("/srv/storage", "/storage");
        assert!(storage.object_path("../etc/passwd").is_err());
        assert!(storage.object_path("/abs/path.png").is_err());
        assert!(storage.object_path("").is_err());
        assert_eq!(
            storage.object_path("images/a.png").unwrap(),
            PathBuf::from("/srv/storage/images/a.png")
        );
    }
}
