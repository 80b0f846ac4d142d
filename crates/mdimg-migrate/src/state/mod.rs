//! Checkpoint persistence.
//!
//! [`FileCheckpointStore`] keeps one pretty-printed JSON file per task id in
//! the state directory (`{state_dir}/{task_id}_state.json`). Writes are atomic
//! and fsynced, so a crash mid-save leaves the previous checkpoint intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use mdimg_core::{CheckpointError, CheckpointStorePort, TaskId, TaskState};

use crate::atomic::atomic_write;

/// Checkpoint store backed by JSON files.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    state_dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the checkpoint file for `task_id`.
    #[must_use]
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.state_dir.join(format!("{task_id}_state.json"))
    }
}

fn io_error(action: &str, path: &Path, err: &std::io::Error) -> CheckpointError {
    CheckpointError::Io(format!("failed to {action} {}: {err}", path.display()))
}

#[async_trait]
impl CheckpointStorePort for FileCheckpointStore {
    async fn save(&self, state: &TaskState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| io_error("create", &self.state_dir, &e))?;

        let path = self.path_for(&state.task_id);
        let json = state
            .to_json()
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        atomic_write(&path, json.as_bytes(), true)
            .await
            .map_err(|e| io_error("write", &path, &e))?;

        tracing::debug!(
            target: "mdimg.state",
            task_id = %state.task_id,
            tasks = state.image_tasks.len(),
            path = %path.display(),
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, CheckpointError> {
        let path = self.path_for(task_id);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, &e)),
        };
        let state = TaskState::from_json(&json)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", path.display())))?;
        if &state.task_id != task_id {
            return Err(CheckpointError::Corrupt(format!(
                "{} belongs to task '{}'",
                path.display(),
                state.task_id
            )));
        }
        Ok(Some(state))
    }

    async fn clear(&self, task_id: &TaskId) -> Result<(), CheckpointError> {
        let path = self.path_for(task_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(target: "mdimg.state", task_id = %task_id, "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, &e)),
        }
    }
}

/// In-memory checkpoint store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<TaskId, TaskState>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored checkpoint for `task_id`.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<TaskState> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(task_id).cloned())
    }
}

#[async_trait]
impl CheckpointStorePort for MemoryCheckpointStore {
    async fn save(&self, state: &TaskState) -> Result<(), CheckpointError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| CheckpointError::Io("checkpoint lock poisoned".to_string()))?;
        states.insert(state.task_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<TaskState>, CheckpointError> {
        let states = self
            .states
            .lock()
            .map_err(|_| CheckpointError::Io("checkpoint lock poisoned".to_string()))?;
        Ok(states.get(task_id).cloned())
    }

    async fn clear(&self, task_id: &TaskId) -> Result<(), CheckpointError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| CheckpointError::Io("checkpoint lock poisoned".to_string()))?;
        states.remove(task_id);
        Ok(())
    }
}
