//! Storage adapters for mdimg.
//!
//! Two implementations of [`StoragePort`]: a local directory and any
//! S3-compatible object store. [`build_storage`] picks one from
//! [`StorageSettings`].

mod local;
mod s3;

use std::sync::Arc;

use mdimg_core::{StorageError, StoragePort, StorageSettings};

pub use local::LocalStorage;
pub use s3::{S3CompatibleStorage, S3Config};

/// Construct the storage adapter described by `settings`.
pub fn build_storage(settings: &StorageSettings) -> Result<Arc<dyn StoragePort>, StorageError> {
    let storage: Arc<dyn StoragePort> = match settings {
        StorageSettings::Local { base_dir, base_url } => {
            Arc::new(LocalStorage::new(base_dir.clone(), base_url.clone()))
        }
        StorageSettings::S3Compatible {
            endpoint,
            bucket,
            region,
            access_key_id,
            secret_access_key,
            public_url,
        } => Arc::new(S3CompatibleStorage::new(S3Config {
            endpoint: endpoint.clone(),
            bucket: bucket.clone(),
            region: region.clone(),
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
            public_url: public_url.clone(),
        })?),
    };

    tracing::debug!(
        target: "mdimg.storage",
        backend = settings.backend_name(),
        "Storage adapter ready"
    );
    Ok(storage)
}
