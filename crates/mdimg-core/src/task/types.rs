//! Task domain types and the per-image state machine.
//!
//! Pure data types with no I/O dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::document::ImageReference;
use crate::errors::{FailureKind, MigrationError};

/// Extensions accepted verbatim when deriving object keys from a URL.
const KNOWN_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "svg",
];

/// Extension used when none can be derived from the URL.
pub const FALLBACK_EXTENSION: &str = "jpg";

/// Identifier of one migration run.
///
/// Task ids end up in file names and object keys, so they are restricted to
/// ASCII alphanumerics, `-` and `_`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

/// A task id contained characters outside the allowed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task id '{0}': use only ASCII letters, digits, '-' and '_'")]
pub struct InvalidTaskId(pub String);

impl TaskId {
    /// Validate and wrap a task id.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidTaskId> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 128
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid { Ok(Self(id)) } else { Err(InvalidTaskId(id)) }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = InvalidTaskId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = InvalidTaskId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Status of a single image task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started, or waiting for another download attempt.
    #[default]
    Pending,
    /// Fetch in progress.
    Downloading,
    /// Fetched bytes are being checked and staged.
    Validating,
    /// Staged file is being written to storage.
    Uploading,
    /// Uploaded; `public_url` is set.
    Completed,
    /// Failed permanently.
    Error,
}

impl TaskStatus {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Completed and error are terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change that the task state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move image task from {from} to {to}")]
    Illegal { from: TaskStatus, to: TaskStatus },

    #[error("retry budget of {max_retries} exhausted")]
    RetriesExhausted { max_retries: u32 },
}

/// One image occurrence being migrated.
///
/// Fields are public for serialization and inspection; status changes go
/// through the transition methods, which keep these invariants:
///
/// - `checksum` is set iff the status is `uploading` or `completed`
/// - `public_url` is set iff the status is `completed`
/// - `retries <= max_retries`, counted per stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTask {
    /// Normalised source URL.
    pub url: String,
    /// Position of the reference in the document (0-based).
    pub index: usize,
    /// File name of the staged copy inside the staging directory.
    pub local_staging_name: String,
    /// Object key in storage.
    pub remote_key: String,
    pub status: TaskStatus,
    pub retries: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// SHA-256 hex of the validated bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Human-readable reason of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Original link text in the document.
    pub token: String,
    /// URL as written inside `token`.
    pub raw_url: String,
}

impl ImageTask {
    /// Create a pending task for the `index`-th reference of a run.
    #[must_use]
    pub fn new(task_id: &TaskId, index: usize, reference: &ImageReference, max_retries: u32) -> Self {
        let ext = guess_extension(&reference.url);
        Self {
            url: reference.url.clone(),
            index,
            local_staging_name: format!("{task_id}_image_{index}.{ext}"),
            remote_key: format!("images/{task_id}/image_{index}.{ext}"),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries,
            content_type: None,
            file_size: None,
            checksum: None,
            error: None,
            failure_kind: None,
            public_url: None,
            token: reference.token.clone(),
            raw_url: reference.raw_url.clone(),
        }
    }

    fn transition(&mut self, allowed: &[TaskStatus], to: TaskStatus) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            self.status = to;
            Ok(())
        } else {
            Err(TransitionError::Illegal {
                from: self.status,
                to,
            })
        }
    }

    /// `pending -> downloading`.
    pub fn begin_download(&mut self) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Pending], TaskStatus::Downloading)
    }

    /// `downloading -> validating`.
    pub fn begin_validation(&mut self) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Downloading], TaskStatus::Validating)
    }

    /// `validating -> uploading`, recording what was staged.
    ///
    /// The retry counter restarts for the upload stage.
    pub fn begin_upload(
        &mut self,
        checksum: impl Into<String>,
        content_type: impl Into<String>,
        file_size: u64,
    ) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Validating], TaskStatus::Uploading)?;
        self.checksum = Some(checksum.into());
        self.content_type = Some(content_type.into());
        self.file_size = Some(file_size);
        self.retries = 0;
        self.error = None;
        Ok(())
    }

    /// `uploading -> completed`.
    pub fn complete(&mut self, public_url: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Uploading], TaskStatus::Completed)?;
        self.public_url = Some(public_url.into());
        self.error = None;
        self.failure_kind = None;
        Ok(())
    }

    fn consume_retry(&mut self) -> Result<(), TransitionError> {
        if self.retries >= self.max_retries {
            return Err(TransitionError::RetriesExhausted {
                max_retries: self.max_retries,
            });
        }
        self.retries += 1;
        Ok(())
    }

    /// `downloading | validating -> pending` after a retryable failure.
    pub fn retry_download(&mut self, error: &MigrationError) -> Result<(), TransitionError> {
        if !matches!(self.status, TaskStatus::Downloading | TaskStatus::Validating) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: TaskStatus::Pending,
            });
        }
        self.consume_retry()?;
        self.status = TaskStatus::Pending;
        self.checksum = None;
        self.error = Some(error.user_message());
        self.failure_kind = Some(error.failure_kind());
        Ok(())
    }

    /// Record a retryable upload failure. The task stays in `uploading`.
    pub fn retry_upload(&mut self, error: &MigrationError) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Uploading {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: TaskStatus::Uploading,
            });
        }
        self.consume_retry()?;
        self.error = Some(error.user_message());
        self.failure_kind = Some(error.failure_kind());
        Ok(())
    }

    /// Any non-terminal status `-> error`.
    pub fn fail(&mut self, error: &MigrationError) -> Result<(), TransitionError> {
        self.fail_with(error.user_message(), error.failure_kind())
    }

    /// Like [`fail`](Self::fail) with an already formatted reason.
    pub fn fail_with(
        &mut self,
        reason: impl Into<String>,
        kind: FailureKind,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: TaskStatus::Error,
            });
        }
        self.status = TaskStatus::Error;
        self.checksum = None;
        self.public_url = None;
        self.error = Some(reason.into());
        self.failure_kind = Some(kind);
        Ok(())
    }

    /// Put the task back to a fresh `pending` state.
    ///
    /// Used when resuming from a checkpoint and when a run is cancelled
    /// before the task settled. Completed tasks are left untouched.
    pub fn reset_to_pending(&mut self) {
        if self.status == TaskStatus::Completed {
            return;
        }
        self.status = TaskStatus::Pending;
        self.retries = 0;
        self.checksum = None;
        self.error = None;
        self.failure_kind = None;
        self.public_url = None;
    }

    /// True if the task finished with a usable result.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
            && self.checksum.as_deref().is_some_and(|c| !c.is_empty())
            && self.public_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn for_test(token: &str, raw_url: &str) -> Self {
        Self {
            url: raw_url.to_string(),
            index: 0,
            local_staging_name: "t_image_0.png".to_string(),
            remote_key: "images/t/image_0.png".to_string(),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: 3,
            content_type: None,
            file_size: None,
            checksum: None,
            error: None,
            failure_kind: None,
            public_url: None,
            token: token.to_string(),
            raw_url: raw_url.to_string(),
        }
    }
}

/// Guess a file extension from a URL path, falling back to `jpg`.
///
/// WeChat-style `wx_fmt` query parameters are honoured when the path has no
/// usable extension.
#[must_use]
pub fn guess_extension(url: &str) -> &'static str {
    let Ok(parsed) = Url::parse(url) else {
        return FALLBACK_EXTENSION;
    };

    let from_path = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| known_extension(ext));

    from_path
        .or_else(|| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "wx_fmt")
                .and_then(|(_, value)| known_extension(&value))
        })
        .unwrap_or(FALLBACK_EXTENSION)
}

fn known_extension(ext: &str) -> Option<&'static str> {
    let lower = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().copied().find(|known| *known == lower)
}
