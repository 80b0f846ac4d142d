//! Object storage port.
//!
//! Adapters receive a staged local file and make it publicly reachable under
//! a key. They know nothing about tasks, retries or documents.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::MigrationError;

/// Errors returned by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The staged file could not be read, or a local write failed.
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// The backend answered with a non-success status.
    #[error("storage rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The backend could not be reached.
    #[error("storage unreachable: {0}")]
    Transport(String),

    /// The adapter is misconfigured (missing bucket, credentials, etc.).
    #[error("storage misconfigured: {0}")]
    Configuration(String),
}

impl From<StorageError> for MigrationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(message) => Self::configuration(message),
            other => Self::storage(other.to_string()),
        }
    }
}

/// Port for the object store images are migrated into.
///
/// # Contract
///
/// - `upload` is idempotent: uploading to an existing key overwrites it
/// - the returned string is the public URL of the object
/// - `content_type` is stored verbatim as the object's MIME type
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Store the file at `local_path` under `key` and return its public URL.
    async fn upload(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove the object stored under `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL an object under `key` is (or would be) served from.
    fn public_url(&self, key: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_stays_fatal() {
        let err: MigrationError = StorageError::Configuration("no bucket".to_string()).into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejections_are_retryable_storage_errors() {
        let err: MigrationError = StorageError::Rejected {
            status: 503,
            message: "slow down".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }
}
