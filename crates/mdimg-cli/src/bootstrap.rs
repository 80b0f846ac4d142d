//! CLI bootstrap, the composition root.
//!
//! This is the only place where concrete adapters are instantiated:
//! - settings from environment variables (after `.env` has been loaded)
//! - the storage adapter (via mdimg-storage)
//! - the reqwest fetcher, checkpoint store and progress reporter (via mdimg-migrate)
//!
//! Handlers receive the composed [`CliContext`] and never build adapters
//! themselves.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use mdimg_core::{
    CheckpointStorePort, HttpFetcher, MigrationSettings, OptimizeSettings, StoragePort,
    StorageSettings,
};
use mdimg_migrate::{
    FileCheckpointStore, MigrationPipeline, PipelineDeps, ProgressReporter, ReqwestFetcher,
};
use mdimg_storage::build_storage;

use crate::error::CliError;

/// Default directory rewritten documents are written to.
pub const DEFAULT_OUTPUT_DIR: &str = "processed";

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub settings: MigrationSettings,
    /// Directory for rewritten documents when `--output` is not given.
    pub output_dir: PathBuf,
}

impl CliConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value. Unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = MigrationSettings::default();
        if let Some(v) = parse(&get, "MAX_CONCURRENT_DOWNLOADS")? {
            settings.max_concurrent_downloads = v;
        }
        if let Some(v) = parse(&get, "DOWNLOAD_TIMEOUT")? {
            settings.download_timeout_secs = v;
        }
        if let Some(v) = parse(&get, "MAX_RETRIES")? {
            settings.max_retries = v;
        }
        if let Some(v) = parse(&get, "MAX_FILE_SIZE")? {
            settings.max_file_size_bytes = v;
        }
        if let Some(v) = parse(&get, "CACHE_MAX_SIZE")? {
            settings.cache_max_size = v;
        }
        if let Some(v) = parse(&get, "CACHE_TTL")? {
            settings.cache_ttl_secs = v;
        }
        if let Some(v) = get("TEMP_DIR") {
            settings.staging_dir = PathBuf::from(v);
        }
        if let Some(v) = get("STATE_DIR") {
            settings.state_dir = PathBuf::from(v);
        }
        settings.optimize = optimize_from(&get)?;
        settings.storage = storage_from(&get)?;

        let output_dir = get("OUTPUT_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from);

        Ok(Self {
            settings,
            output_dir,
        })
    }
}

fn parse<T, G>(get: &G, key: &str) -> Result<Option<T>, CliError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| CliError::Config(format!("{key}='{raw}' is not valid: {e}")))
        })
        .transpose()
}

/// Optimisation is enabled as soon as any of its variables is set.
fn optimize_from<G>(get: &G) -> Result<Option<OptimizeSettings>, CliError>
where
    G: Fn(&str) -> Option<String>,
{
    let max_width = parse(get, "IMAGE_MAX_WIDTH")?;
    let max_height = parse(get, "IMAGE_MAX_HEIGHT")?;
    let quality = parse(get, "IMAGE_QUALITY")?;
    if max_width.is_none() && max_height.is_none() && quality.is_none() {
        return Ok(None);
    }
    let defaults = OptimizeSettings::default();
    Ok(Some(OptimizeSettings {
        max_width: max_width.unwrap_or(defaults.max_width),
        max_height: max_height.unwrap_or(defaults.max_height),
        quality: quality.unwrap_or(defaults.quality),
    }))
}

fn storage_from<G>(get: &G) -> Result<StorageSettings, CliError>
where
    G: Fn(&str) -> Option<String>,
{
    let backend = get("STORAGE_BACKEND").unwrap_or_else(|| "local".to_string());
    match backend.to_ascii_lowercase().as_str() {
        "local" => {
            let mut storage = StorageSettings::default();
            if let StorageSettings::Local { base_dir, base_url } = &mut storage {
                if let Some(dir) = get("LOCAL_STORAGE_DIR") {
                    *base_dir = PathBuf::from(dir);
                }
                if let Some(url) = get("LOCAL_STORAGE_URL") {
                    *base_url = url;
                }
            }
            Ok(storage)
        }
        "s3" | "r2" => Ok(StorageSettings::S3Compatible {
            endpoint: get("R2_ENDPOINT_URL").unwrap_or_default(),
            bucket: get("R2_BUCKET_NAME").unwrap_or_default(),
            region: get("R2_REGION").unwrap_or_else(|| "auto".to_string()),
            access_key_id: get("R2_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: get("R2_SECRET_ACCESS_KEY").unwrap_or_default(),
            public_url: get("R2_PUBLIC_URL"),
        }),
        other => Err(CliError::Config(format!(
            "STORAGE_BACKEND must be 'local' or 's3', got '{other}'"
        ))),
    }
}

/// Fully composed adapters for CLI commands.
pub struct CliContext {
    pub config: CliConfig,
    pub storage: Arc<dyn StoragePort>,
    pub checkpoints: Arc<dyn CheckpointStorePort>,
    pub reporter: Arc<ProgressReporter>,
    pub fetcher: Arc<dyn HttpFetcher>,
}

impl CliContext {
    #[must_use]
    pub const fn settings(&self) -> &MigrationSettings {
        &self.config.settings
    }

    /// Assemble a pipeline over the context's adapters.
    #[must_use]
    pub fn pipeline(&self) -> MigrationPipeline {
        MigrationPipeline::new(PipelineDeps {
            fetcher: Arc::clone(&self.fetcher),
            storage: Arc::clone(&self.storage),
            checkpoints: Arc::clone(&self.checkpoints),
            reporter: Arc::clone(&self.reporter),
            settings: self.config.settings.clone(),
        })
    }
}

/// Validate `config` and build every adapter it describes.
pub fn bootstrap(config: CliConfig) -> Result<CliContext, CliError> {
    config.settings.validate()?;

    let storage = build_storage(&config.settings.storage)?;
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(
        ReqwestFetcher::new().map_err(|e| CliError::Config(format!("HTTP client: {e}")))?,
    );
    let checkpoints: Arc<dyn CheckpointStorePort> =
        Arc::new(FileCheckpointStore::new(config.settings.state_dir.clone()));

    tracing::debug!(
        backend = config.settings.storage.backend_name(),
        state_dir = %config.settings.state_dir.display(),
        "CLI context ready"
    );

    Ok(CliContext {
        config,
        storage,
        checkpoints,
        reporter: Arc::new(ProgressReporter::new()),
        fetcher,
    })
}
