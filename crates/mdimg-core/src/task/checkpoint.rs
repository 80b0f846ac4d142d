//! Checkpoint format and resume planning.
//!
//! A checkpoint is a snapshot of the submitted document plus every image task
//! of a run. Resuming from a checkpoint keeps completed work and resets
//! everything else, so resuming twice from the same checkpoint yields the same
//! task list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ImageTask, TaskId, TaskStatus};
use crate::document::Extraction;

/// Persisted state of one migration run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: TaskId,
    /// The submitted document, verbatim.
    pub content: String,
    pub image_tasks: Vec<ImageTask>,
    pub timestamp: DateTime<Utc>,
}

impl TaskState {
    /// Snapshot `image_tasks` now.
    #[must_use]
    pub fn new(task_id: TaskId, content: impl Into<String>, image_tasks: Vec<ImageTask>) -> Self {
        Self {
            task_id,
            content: content.into(),
            image_tasks,
            timestamp: Utc::now(),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a checkpoint file.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Number of tasks in the given status.
    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.image_tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Why a checkpoint was not used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The checkpoint was taken for a different document.
    DocumentChanged,
    /// The checkpoint's tasks do not line up with the document's references.
    TaskMismatch,
}

/// The task list a run starts with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskPlan {
    pub tasks: Vec<ImageTask>,
    /// Tasks carried over as completed from the checkpoint.
    pub resumed: usize,
    /// Set when a checkpoint existed but could not be used.
    pub discarded: Option<DiscardReason>,
}

/// Build the task list for a run, resuming from `checkpoint` when it matches.
///
/// Completed tasks with a checksum and public URL are kept. All other tasks
/// are reset to `pending` with a fresh retry budget of `max_retries`.
#[must_use]
pub fn plan_tasks(
    task_id: &TaskId,
    document: &str,
    extraction: &Extraction,
    checkpoint: Option<TaskState>,
    max_retries: u32,
) -> TaskPlan {
    let fresh = || {
        extraction
            .references
            .iter()
            .enumerate()
            .map(|(index, reference)| ImageTask::new(task_id, index, reference, max_retries))
            .collect::<Vec<_>>()
    };

    let Some(state) = checkpoint else {
        return TaskPlan {
            tasks: fresh(),
            resumed: 0,
            discarded: None,
        };
    };

    if state.content != document {
        return TaskPlan {
            tasks: fresh(),
            resumed: 0,
            discarded: Some(DiscardReason::DocumentChanged),
        };
    }

    let lines_up = state.image_tasks.len() == extraction.references.len()
        && state
            .image_tasks
            .iter()
            .zip(&extraction.references)
            .enumerate()
            .all(|(index, (task, reference))| {
                task.index == index && task.url == reference.url && task.token == reference.token
            });
    if !lines_up {
        return TaskPlan {
            tasks: fresh(),
            resumed: 0,
            discarded: Some(DiscardReason::TaskMismatch),
        };
    }

    let mut resumed = 0;
    let tasks = state
        .image_tasks
        .into_iter()
        .map(|mut task| {
            task.max_retries = max_retries;
            if task.is_completed() {
                resumed += 1;
            } else {
                // Completed without a usable result is treated as not done.
                task.status = TaskStatus::Pending;
                task.reset_to_pending();
            }
            task
        })
        .collect();

    TaskPlan {
        tasks,
        resumed,
        discarded: None,
    }
}
