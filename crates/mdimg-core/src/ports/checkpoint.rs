//! Checkpoint store port.
//!
//! # Design
//!
//! - One checkpoint per task id; saving replaces the previous one
//! - Checkpoint failures are logged by the pipeline, never fatal to a run
//! - `load` of a missing checkpoint is `Ok(None)`, not an error

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{TaskId, TaskState};

/// Errors from checkpoint persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(String),

    #[error("checkpoint is unreadable: {0}")]
    Corrupt(String),
}

/// Port for persisting [`TaskState`] snapshots between runs.
#[async_trait]
pub trait CheckpointStorePort: Send + Sync {
    /// Atomically replace the checkpoint for `state.task_id`.
    async fn save(&self, state: &TaskState) -> Result<(), CheckpointError>;

    /// Load the checkpoint for `task_id`, if one exists.
    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, CheckpointError>;

    /// Delete the checkpoint for `task_id`. Clearing a missing checkpoint succeeds.
    async fn clear(&self, task_id: &TaskId) -> Result<(), CheckpointError>;
}
