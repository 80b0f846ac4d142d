//! Upload of staged images to storage.

use std::sync::Arc;

use mdimg_core::{MigrationError, StoragePort};

use crate::download::StagedImage;

/// Pushes staged images through a [`StoragePort`].
///
/// Uploading the same key twice overwrites the object, so retries are safe.
#[derive(Clone)]
pub struct UploadWorker {
    storage: Arc<dyn StoragePort>,
}

impl std::fmt::Debug for UploadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadWorker").finish_non_exhaustive()
    }
}

impl UploadWorker {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// Upload `staged` under `remote_key` and return its public URL.
    ///
    /// The content type is the validated kind's, regardless of the key's
    /// extension.
    pub async fn upload(
        &self,
        staged: &StagedImage,
        remote_key: &str,
    ) -> Result<String, MigrationError> {
        let content_type = staged.kind.mime_type();
        match self
            .storage
            .upload(&staged.path, remote_key, content_type)
            .await
        {
            Ok(url) => {
                tracing::debug!(
                    target: "mdimg.upload",
                    key = %remote_key,
                    content_type,
                    size = staged.size,
                    url = %url,
                    "Uploaded image"
                );
                Ok(url)
            }
            Err(e) => {
                tracing::warn!(target: "mdimg.upload", key = %remote_key, error = %e, "Upload failed");
                Err(e.into())
            }
        }
    }
}
