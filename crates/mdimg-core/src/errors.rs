//! Migration error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error` or `reqwest::Error`. For I/O errors, we
//! capture the kind and message as strings.
//!
//! Whether an error is retried is a property of its variant, decided once in
//! [`MigrationError::is_retryable`], never inferred at call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why fetched content was rejected by validation.
///
/// `Placeholder` and `Corrupt` are deliberately separate: placeholders are
/// skipped tracking pixels, corrupt images are genuine failures, and the run
/// statistics count them apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    /// MIME type (declared or sniffed) is not on the allow-list.
    UnsupportedType,
    /// Payload exceeds the configured maximum file size.
    Oversized,
    /// Content failed to decode or is structurally broken.
    Corrupt,
    /// Content is a 1x1 / fully transparent tracking placeholder.
    Placeholder,
}

impl ValidationFailure {
    /// Stable string form used in logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedType => "unsupported_type",
            Self::Oversized => "oversized",
            Self::Corrupt => "corrupt",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Coarse classification of a task failure, persisted with the task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    UnsupportedType,
    Oversized,
    Corrupt,
    Placeholder,
    Storage,
    Io,
    Configuration,
    Cancelled,
}

impl From<ValidationFailure> for FailureKind {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::UnsupportedType => Self::UnsupportedType,
            ValidationFailure::Oversized => Self::Oversized,
            ValidationFailure::Corrupt => Self::Corrupt,
            ValidationFailure::Placeholder => Self::Placeholder,
        }
    }
}

/// Error type for migration operations.
///
/// Designed to be serializable across process boundaries (checkpoint files,
/// progress transports) without depending on non-serializable types.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationError {
    /// Timeout, connection reset, non-2xx status or truncated body.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Fetched content was rejected. Never retried.
    #[error("Validation failed ({}): {message}", failure.as_str())]
    Validation {
        /// Which validation rule rejected the content.
        failure: ValidationFailure,
        /// Detailed error message.
        message: String,
    },

    /// Object storage rejected or failed the upload.
    #[error("Storage error: {message}")]
    Storage {
        /// Detailed error message.
        message: String,
    },

    /// Missing credentials, endpoint or out-of-range settings. Fatal for the run.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message.
        message: String,
    },

    /// I/O error while staging files.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The run was cancelled before this operation could start or retry.
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn http_status(status_code: u16) -> Self {
        Self::Network {
            message: format!("HTTP {status_code}"),
            status_code: Some(status_code),
        }
    }

    /// Create a validation error.
    pub fn validation(failure: ValidationFailure, message: impl Into<String>) -> Self {
        Self::Validation {
            failure,
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Check if this error may succeed on another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Storage { .. } | Self::Io { .. }
        )
    }

    /// Check if this error aborts the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify this error for persistence and statistics.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Validation { failure, .. } => match failure {
                ValidationFailure::UnsupportedType => FailureKind::UnsupportedType,
                ValidationFailure::Oversized => FailureKind::Oversized,
                ValidationFailure::Corrupt => FailureKind::Corrupt,
                ValidationFailure::Placeholder => FailureKind::Placeholder,
            },
            Self::Storage { .. } => FailureKind::Storage,
            Self::Configuration { .. } => FailureKind::Configuration,
            Self::Io { .. } => FailureKind::Io,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network {
                status_code: Some(code),
                ..
            } => format!("HTTP {code}"),
            Self::Network { message, .. } => format!("Network error: {message}"),
            Self::Validation {
                failure: ValidationFailure::Placeholder,
                ..
            } => "Skipped placeholder image".to_string(),
            Self::Validation { message, .. } => format!("Invalid image: {message}"),
            Self::Storage { message } => format!("Upload failed: {message}"),
            Self::Configuration { message } => format!("Configuration error: {message}"),
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Cancelled => "Migration was cancelled.".to_string(),
        }
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Convenience result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;
