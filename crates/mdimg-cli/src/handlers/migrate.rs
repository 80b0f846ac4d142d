//! Migrate command handler.
//!
//! Runs the pipeline over one document, writes the rewritten copy and prints
//! either a summary or the JSON report. Ctrl+C cancels the run; the
//! checkpoint stays on disk so the same `--task-id` resumes it.
//!
//! A fatal pipeline error (misconfigured storage) produces no report, so no
//! document is written. The checkpoint is kept for the rerun.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdimg_core::{MigrationReport, TaskId};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{BarObserver, print_summary};

/// Arguments for the migrate command.
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub task_id: Option<String>,
    pub json: bool,
}

/// Result of a migrate invocation.
#[derive(Debug)]
pub struct MigrateOutcome {
    pub task_id: TaskId,
    pub output: PathBuf,
    pub report: MigrationReport,
}

fn resolve_task_id(requested: Option<&str>) -> Result<TaskId, CliError> {
    match requested {
        Some(id) => Ok(TaskId::new(id)?),
        None => Ok(TaskId::new(uuid::Uuid::new_v4().simple().to_string())?),
    }
}

/// Output path for the rewritten document.
pub fn output_path(ctx: &CliContext, requested: Option<&Path>, task_id: &TaskId) -> PathBuf {
    requested.map_or_else(
        || ctx.config.output_dir.join(format!("{task_id}.md")),
        Path::to_path_buf,
    )
}

/// Execute the migrate command with Ctrl+C wired to cancellation.
pub async fn execute(ctx: &CliContext, args: MigrateArgs) -> Result<MigrateOutcome, CliError> {
    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight images");
                cancel.cancel();
            }
        }
    });

    let result = run(ctx, args, cancel).await;
    ctrl_c.abort();
    result
}

/// Execute the migrate command under an external cancellation token.
pub async fn run(
    ctx: &CliContext,
    args: MigrateArgs,
    cancel: CancellationToken,
) -> Result<MigrateOutcome, CliError> {
    let task_id = resolve_task_id(args.task_id.as_deref())?;
    let document = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|e| CliError::Io(format!("cannot read {}: {e}", args.input.display())))?;

    if !args.json {
        ctx.reporter.subscribe(Arc::new(BarObserver::new()));
    }

    let pipeline = ctx.pipeline();
    let report = pipeline.run(&task_id, &document, cancel).await?;

    let output = output_path(ctx, args.output.as_deref(), &task_id);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output, &report.document)
        .await
        .map_err(|e| CliError::Io(format!("cannot write {}: {e}", output.display())))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Migration(format!("cannot serialize report: {e}")))?;
        println!("{json}");
    } else {
        print_summary(&report);
        println!("\nTask id:  {task_id}");
        println!("Output:   {}", output.display());
    }

    Ok(MigrateOutcome {
        task_id,
        output,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_task_ids_are_valid_and_unique() {
        let a = resolve_task_id(None).unwrap();
        let b = resolve_task_id(None).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_requested_task_id_is_validated() {
        assert_eq!(resolve_task_id(Some("post-1")).unwrap().as_str(), "post-1");
        let err = resolve_task_id(Some("../escape")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
