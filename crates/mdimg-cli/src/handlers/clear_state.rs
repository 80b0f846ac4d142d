//! Clear-state command handler.

use mdimg_core::TaskId;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Delete the checkpoint saved for `task_id`.
pub async fn execute(ctx: &CliContext, task_id: &str) -> Result<(), CliError> {
    let task_id = TaskId::new(task_id)?;
    ctx.checkpoints.clear(&task_id).await?;
    ctx.reporter.forget(&task_id);
    println!("Cleared checkpoint for {task_id}");
    Ok(())
}
