//! Migration settings and their validation.
//!
//! Settings are plain serde data with defaults for every field. Range checks
//! live in [`MigrationSettings::validate`] and run before a pipeline starts.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
/// 100 MiB.
pub const MAX_FILE_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// MIME types accepted by default.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "image/svg+xml",
];

/// Where uploaded images end up.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageSettings {
    /// Copy files under a local directory, served from `base_url`.
    Local { base_dir: PathBuf, base_url: String },
    /// S3-compatible object storage (R2, `MinIO`, AWS).
    S3Compatible {
        endpoint: String,
        bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
        /// Public base URL objects are served from. Defaults to
        /// `{endpoint}/{bucket}` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_url: Option<String>,
    },
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::Local {
            base_dir: PathBuf::from("storage"),
            base_url: "/storage".to_string(),
        }
    }
}

impl StorageSettings {
    /// Short backend name for logs.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3Compatible { .. } => "s3",
        }
    }
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { base_dir, base_url } => f
                .debug_struct("Local")
                .field("base_dir", base_dir)
                .field("base_url", base_url)
                .finish(),
            Self::S3Compatible {
                endpoint,
                bucket,
                region,
                access_key_id,
                public_url,
                ..
            } => f
                .debug_struct("S3Compatible")
                .field("endpoint", endpoint)
                .field("bucket", bucket)
                .field("region", region)
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .field("public_url", public_url)
                .finish(),
        }
    }
}

/// Resize and recompression applied to raster images after validation.
///
/// Images larger than `max_width` x `max_height` are scaled down to fit,
/// keeping their aspect ratio. JPEG output is encoded at `quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeSettings {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            quality: 85,
        }
    }
}

/// All tunables of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Maximum number of in-flight fetch or upload attempts (1-10).
    pub max_concurrent_downloads: usize,
    /// Base timeout for one download attempt in seconds (5-60).
    pub download_timeout_secs: u64,
    /// Retries per stage after the first attempt (1-5).
    pub max_retries: u32,
    pub max_file_size_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    /// Maximum entries per cache.
    pub cache_max_size: usize,
    pub cache_ttl_secs: u64,
    /// Persist a checkpoint after this many settled tasks.
    pub checkpoint_interval: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_factor: f64,
    /// Fraction of the delay used as uniform random jitter, in `[0, 1)`.
    pub retry_jitter: f64,
    pub staging_dir: PathBuf,
    pub state_dir: PathBuf,
    pub storage: StorageSettings,
    /// Optimisation is off unless set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize: Option<OptimizeSettings>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
            download_timeout_secs: 30,
            max_retries: 3,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            cache_max_size: 1000,
            cache_ttl_secs: 3600,
            checkpoint_interval: 5,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_factor: 2.0,
            retry_jitter: 0.1,
            staging_dir: PathBuf::from("temp"),
            state_dir: PathBuf::from("processed/state"),
            storage: StorageSettings::default(),
            optimize: None,
        }
    }
}

impl MigrationSettings {
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=10).contains(&self.max_concurrent_downloads) {
            return Err(SettingsError::InvalidConcurrency(
                self.max_concurrent_downloads,
            ));
        }
        if !(5..=60).contains(&self.download_timeout_secs) {
            return Err(SettingsError::InvalidTimeout(self.download_timeout_secs));
        }
        if !(1..=5).contains(&self.max_retries) {
            return Err(SettingsError::InvalidMaxRetries(self.max_retries));
        }
        if !(1..=MAX_FILE_SIZE_LIMIT).contains(&self.max_file_size_bytes) {
            return Err(SettingsError::InvalidMaxFileSize(self.max_file_size_bytes));
        }
        if self.allowed_mime_types.iter().all(|m| m.trim().is_empty()) {
            return Err(SettingsError::EmptyMimeAllowList);
        }
        if self.cache_max_size == 0 {
            return Err(SettingsError::InvalidCacheSize);
        }
        if self.cache_ttl_secs == 0 {
            return Err(SettingsError::InvalidCacheTtl);
        }
        if self.checkpoint_interval == 0 {
            return Err(SettingsError::InvalidCheckpointInterval);
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms
            || !self.retry_factor.is_finite()
            || self.retry_factor < 1.0
            || !(0.0..1.0).contains(&self.retry_jitter)
        {
            return Err(SettingsError::InvalidRetryPolicy);
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyPath("staging_dir"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyPath("state_dir"));
        }
        if let Some(optimize) = &self.optimize {
            if !(1..=100).contains(&optimize.quality) {
                return Err(SettingsError::InvalidQuality(optimize.quality));
            }
            if optimize.max_width == 0 || optimize.max_height == 0 {
                return Err(SettingsError::InvalidMaxDimensions);
            }
        }
        validate_storage(&self.storage)
    }
}

fn validate_storage(storage: &StorageSettings) -> Result<(), SettingsError> {
    match storage {
        StorageSettings::Local { base_dir, .. } => {
            if base_dir.as_os_str().is_empty() {
                return Err(SettingsError::EmptyPath("storage.base_dir"));
            }
        }
        StorageSettings::S3Compatible {
            endpoint,
            bucket,
            region,
            access_key_id,
            secret_access_key,
            ..
        } => {
            let required = [
                ("endpoint", endpoint),
                ("bucket", bucket),
                ("region", region),
                ("access_key_id", access_key_id),
                ("secret_access_key", secret_access_key),
            ];
            if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
                return Err(SettingsError::MissingStorageField(*name));
            }
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(SettingsError::InvalidEndpoint(endpoint.clone()));
            }
        }
    }
    Ok(())
}

/// Errors that can occur when validating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Max concurrent downloads must be between 1 and 10, got {0}")]
    InvalidConcurrency(usize),

    #[error("Download timeout must be between 5 and 60 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("Max retries must be between 1 and 5, got {0}")]
    InvalidMaxRetries(u32),

    #[error("Max file size must be between 1 byte and 100 MiB, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("Allowed MIME types cannot be empty")]
    EmptyMimeAllowList,

    #[error("Cache max size must be at least 1")]
    InvalidCacheSize,

    #[error("Cache TTL must be at least 1 second")]
    InvalidCacheTtl,

    #[error("Checkpoint interval must be at least 1")]
    InvalidCheckpointInterval,

    #[error("Retry policy requires base <= max delay, factor >= 1 and jitter in [0, 1)")]
    InvalidRetryPolicy,

    #[error("Image quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("Maximum image width and height must be at least 1")]
    InvalidMaxDimensions,

    #[error("Path setting '{0}' cannot be empty")]
    EmptyPath(&'static str),

    #[error("S3 storage requires '{0}'")]
    MissingStorageField(&'static str),

    #[error("S3 endpoint must be an http(s) URL, got '{0}'")]
    InvalidEndpoint(String),
}
