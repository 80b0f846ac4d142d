//! Per-image worker.
//!
//! A worker owns one [`ImageTask`] for its whole life and hands it back to
//! the orchestrator when it settles. It never touches the run's task list.
//!
//! # Design Principles
//!
//! - The semaphore is held for one attempt and released before backoff sleeps
//! - Cancellation is checked before every attempt and races every wait
//! - A task interrupted by cancellation goes back to `pending`
//! - Staged files are removed once the task settles, whatever the outcome

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::OwnedSemaphorePermit;

use mdimg_core::{ImageTask, MigrationError, ProgressStage, TaskStatus, TransitionError};

use crate::download::StagedImage;

use super::context::RunContext;

/// A task handed back to the orchestrator.
#[derive(Debug)]
pub(crate) struct SettledTask {
    pub position: usize,
    pub task: ImageTask,
    /// The failure that ended the task, when it failed.
    pub error: Option<MigrationError>,
}

impl SettledTask {
    /// True if cancellation sent the task back to `pending`.
    pub fn interrupted(&self) -> bool {
        self.task.status == TaskStatus::Pending
    }
}

fn transition(
    task: &mut ImageTask,
    step: impl FnOnce(&mut ImageTask) -> Result<(), TransitionError>,
) {
    if let Err(e) = step(task) {
        tracing::error!(
            target: "mdimg.pipeline",
            url = %task.url,
            status = %task.status,
            error = %e,
            "Illegal task transition"
        );
    }
}

enum Step<T> {
    Done(T),
    Settled,
}

/// Drive `task` through download, validation, staging and upload.
pub(crate) async fn run_task(
    ctx: Arc<RunContext>,
    position: usize,
    mut task: ImageTask,
) -> SettledTask {
    let error = match process(&ctx, &mut task).await {
        Ok(()) => None,
        Err(e) => Some(e),
    };
    SettledTask {
        position,
        task,
        error,
    }
}

async fn process(ctx: &RunContext, task: &mut ImageTask) -> Result<(), MigrationError> {
    let staged = match download_with_retries(ctx, task).await? {
        Step::Done(staged) => staged,
        Step::Settled => return Ok(()),
    };

    let result = upload_with_retries(ctx, task, &staged).await;
    if let Err(e) = tokio::fs::remove_file(&staged.path).await {
        tracing::debug!(
            target: "mdimg.pipeline",
            path = %staged.path.display(),
            error = %e,
            "Failed to remove staged file"
        );
    }
    result
}

async fn acquire(ctx: &RunContext) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => None,
        permit = ctx.semaphore.clone().acquire_owned() => permit.ok(),
    }
}

/// Sleep before retry `attempt + 1`. Returns false if cancelled meanwhile.
async fn backoff(ctx: &RunContext, attempt: u32) -> bool {
    let delay = ctx.retry.delay(attempt);
    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

fn interrupt(task: &mut ImageTask) {
    tracing::debug!(target: "mdimg.pipeline", url = %task.url, "Task interrupted by cancellation");
    task.reset_to_pending();
}

fn fail(task: &mut ImageTask, error: &MigrationError) {
    transition(task, |t| t.fail(error));
}

async fn download_with_retries(
    ctx: &RunContext,
    task: &mut ImageTask,
) -> Result<Step<StagedImage>, MigrationError> {
    loop {
        if ctx.cancel.is_cancelled() {
            interrupt(task);
            return Ok(Step::Settled);
        }
        let Some(permit) = acquire(ctx).await else {
            interrupt(task);
            return Ok(Step::Settled);
        };
        if let Some(known) = ctx.known_bad.check(&task.url).await {
            fail(task, &known);
            return Err(known);
        }

        let attempt = task.retries + 1;
        transition(task, ImageTask::begin_download);
        ctx.report_stage(ProgressStage::Downloading, &task.url);
        let result = match ctx.download.fetch(&task.url, attempt).await {
            Ok(payload) => {
                transition(task, ImageTask::begin_validation);
                ctx.report_stage(ProgressStage::Validating, &task.url);
                ctx.download.stage(payload, &task.local_staging_name).await
            }
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(staged) => {
                drop(permit);
                transition(task, |t| {
                    t.begin_upload(&staged.checksum, &staged.content_type, staged.size)
                });
                return Ok(Step::Done(staged));
            }
            Err(e) => e,
        };

        if ctx.retry.should_retry(&error, attempt) && task.retry_download(&error).is_ok() {
            drop(permit);
            tracing::warn!(
                target: "mdimg.pipeline",
                url = %task.url,
                attempt,
                max_attempts = ctx.retry.max_attempts(),
                error = %error,
                "Download failed, retrying"
            );
            if !backoff(ctx, attempt).await {
                interrupt(task);
                return Ok(Step::Settled);
            }
            continue;
        }

        // Recorded before the permit goes, so a queued task for the same URL
        // sees it.
        ctx.known_bad.record(&task.url, &error).await;
        drop(permit);
        log_failure(task, &error, attempt);
        fail(task, &error);
        return Err(error);
    }
}

async fn upload_with_retries(
    ctx: &RunContext,
    task: &mut ImageTask,
    staged: &StagedImage,
) -> Result<(), MigrationError> {
    if let Some(url) = ctx.checksum_memo.get(&staged.checksum).await {
        tracing::debug!(
            target: "mdimg.pipeline",
            url = %task.url,
            checksum = %staged.checksum,
            public_url = %url,
            "Identical content already uploaded, reusing"
        );
        transition(task, |t| t.complete(url));
        ctx.deduplicated.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    loop {
        if ctx.cancel.is_cancelled() {
            interrupt(task);
            return Ok(());
        }
        let Some(permit) = acquire(ctx).await else {
            interrupt(task);
            return Ok(());
        };

        let attempt = task.retries + 1;
        ctx.report_stage(ProgressStage::Uploading, &task.url);
        let result = ctx.upload.upload(staged, &task.remote_key).await;
        drop(permit);

        let error = match result {
            Ok(url) => {
                transition(task, |t| t.complete(url));
                return Ok(());
            }
            Err(e) => e,
        };

        if ctx.retry.should_retry(&error, attempt) && task.retry_upload(&error).is_ok() {
            tracing::warn!(
                target: "mdimg.pipeline",
                url = %task.url,
                key = %task.remote_key,
                attempt,
                max_attempts = ctx.retry.max_attempts(),
                error = %error,
                "Upload failed, retrying"
            );
            if !backoff(ctx, attempt).await {
                interrupt(task);
                return Ok(());
            }
            continue;
        }

        log_failure(task, &error, attempt);
        fail(task, &error);
        return Err(error);
    }
}

fn log_failure(task: &ImageTask, error: &MigrationError, attempts: u32) {
    if matches!(
        error,
        MigrationError::Validation {
            failure: mdimg_core::ValidationFailure::Placeholder,
            ..
        }
    ) {
        tracing::info!(target: "mdimg.pipeline", url = %task.url, "Skipping placeholder image");
    } else {
        tracing::warn!(
            target: "mdimg.pipeline",
            url = %task.url,
            attempts,
            error = %error,
            "Image failed"
        );
    }
}
