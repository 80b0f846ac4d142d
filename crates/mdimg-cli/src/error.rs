//! CLI error types and their exit codes.

use mdimg_core::{CheckpointError, InvalidTaskId, MigrationError, SettingsError, StorageError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// The migration itself failed.
    #[error("{0}")]
    Migration(String),

    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object storage error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CliError {
    /// Map error to an exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Invalid arguments
    /// - 64-78: Specific categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Migration(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Storage(_) => 69,  // EX_UNAVAILABLE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Configuration { message } => Self::Config(message),
            MigrationError::Io { .. } => Self::Io(err.user_message()),
            MigrationError::Storage { message } => Self::Storage(message),
            other => Self::Migration(other.user_message()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(message) => Self::Config(message),
            StorageError::Io(message) => Self::Io(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<CheckpointError> for CliError {
    fn from(err: CheckpointError) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<InvalidTaskId> for CliError {
    fn from(err: InvalidTaskId) -> Self {
        Self::Arguments(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config: CliError = MigrationError::configuration("no bucket").into();
        assert_eq!(config.exit_code(), 78);

        let io: CliError = std::io::Error::other("disk full").into();
        assert_eq!(io.exit_code(), 74);

        let task_id: CliError = InvalidTaskId("a b".to_string()).into();
        assert_eq!(task_id.exit_code(), 2);
    }

    #[test]
    fn test_storage_configuration_maps_to_config() {
        let err: CliError = StorageError::Configuration("missing bucket".to_string()).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("missing bucket"));
    }
}
