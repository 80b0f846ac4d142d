//! Image tasks, their state machine and the checkpoint format.

mod checkpoint;
mod types;

pub use checkpoint::{DiscardReason, TaskPlan, TaskState, plan_tasks};
pub use types::{
    FALLBACK_EXTENSION, ImageTask, InvalidTaskId, TaskId, TaskStatus, TransitionError,
    guess_extension,
};
