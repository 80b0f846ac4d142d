//! Migration orchestrator.
//!
//! [`MigrationPipeline::run`] takes one document from extracted links to a
//! rewritten document plus a report.
//!
//! # Architecture
//!
//! - **Orchestrator**: plans tasks, spawns workers, owns the task list and
//!   checkpoints, rewrites the document once every worker has settled
//! - **Worker**: owns one task while it runs (see `worker`), never writes to
//!   the task list
//! - **Run context**: per-run caches and limits shared by the workers
//!
//! # Concurrency Model
//!
//! - One semaphore bounds in-flight attempts across the whole run
//! - Workers run on a `JoinSet`; settled tasks come back through `join_next`
//! - The document is rewritten only after the last worker settled

mod context;
mod worker;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mdimg_core::{
    CheckpointStorePort, FailureKind, HttpFetcher, ImageTask, MigrationError, MigrationReport,
    MigrationSettings, PipelineState, ProgressDetails, ProgressEvent, ProgressStage, RunCounters,
    StoragePort, TaskId, TaskState, TaskStatus, extract_references, plan_tasks, rewrite_document,
};

use crate::cache::Cache;
use crate::download::{DownloadWorker, KnownBadUrls, OriginHeaders};
use crate::optimize::ImageOptimizer;
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;
use crate::upload::UploadWorker;
use crate::validate::ContentValidator;

use context::RunContext;
use worker::{SettledTask, run_task};

/// Everything a pipeline needs from the outside world.
pub struct PipelineDeps {
    pub fetcher: Arc<dyn HttpFetcher>,
    pub storage: Arc<dyn StoragePort>,
    pub checkpoints: Arc<dyn CheckpointStorePort>,
    pub reporter: Arc<ProgressReporter>,
    pub settings: MigrationSettings,
}

/// Runs image migrations.
pub struct MigrationPipeline {
    fetcher: Arc<dyn HttpFetcher>,
    storage: Arc<dyn StoragePort>,
    checkpoints: Arc<dyn CheckpointStorePort>,
    reporter: Arc<ProgressReporter>,
    settings: MigrationSettings,
    retry: RetryPolicy,
    origin_headers: OriginHeaders,
    state_tx: watch::Sender<PipelineState>,
}

impl std::fmt::Debug for MigrationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPipeline")
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Aggregate of the task list while workers are running.
#[derive(Debug, Default)]
struct Tally {
    settled: usize,
    success: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    fn count(&mut self, task: &ImageTask) {
        match task.status {
            TaskStatus::Completed => {
                self.settled += 1;
                self.success += 1;
            }
            TaskStatus::Error if task.failure_kind == Some(FailureKind::Placeholder) => {
                self.settled += 1;
                self.skipped += 1;
            }
            TaskStatus::Error => {
                self.settled += 1;
                self.failed += 1;
            }
            _ => {}
        }
    }
}

impl MigrationPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self {
            retry: RetryPolicy::from_settings(&deps.settings),
            fetcher: deps.fetcher,
            storage: deps.storage,
            checkpoints: deps.checkpoints,
            reporter: deps.reporter,
            settings: deps.settings,
            origin_headers: OriginHeaders::default(),
            state_tx,
        }
    }

    /// Replace the backoff policy derived from the settings.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the default per-origin header rules.
    #[must_use]
    pub fn with_origin_headers(mut self, origin_headers: OriginHeaders) -> Self {
        self.origin_headers = origin_headers;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    #[must_use]
    pub const fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: PipelineState) {
        tracing::debug!(target: "mdimg.pipeline", state = ?state, "Pipeline state changed");
        self.state_tx.send_replace(state);
    }

    fn publish(&self, task_id: &TaskId, stage: ProgressStage, total: usize, tally: &Tally) {
        let message = match stage {
            ProgressStage::Started => format!("Migrating {total} images"),
            ProgressStage::Finished => format!(
                "Finished: {} migrated, {} failed, {} skipped",
                tally.success, tally.failed, tally.skipped
            ),
            ProgressStage::Cancelled => format!("Cancelled after {}/{total}", tally.settled),
            _ => format!("Processed {}/{total}", tally.settled),
        };
        self.reporter.publish(ProgressEvent::new(
            task_id.clone(),
            message,
            ProgressDetails {
                total,
                current: tally.settled,
                success: tally.success,
                failed: tally.failed,
                skipped: tally.skipped,
                stage: Some(stage),
                url: None,
            },
        ));
    }

    async fn save_checkpoint(&self, task_id: &TaskId, document: &str, tasks: &[ImageTask]) {
        let state = TaskState::new(task_id.clone(), document, tasks.to_vec());
        if let Err(e) = self.checkpoints.save(&state).await {
            tracing::warn!(target: "mdimg.pipeline", task_id = %task_id, error = %e, "Failed to save checkpoint");
        }
    }

    async fn prepare(&self) -> Result<(), MigrationError> {
        self.settings
            .validate()
            .map_err(|e| MigrationError::configuration(e.to_string()))?;
        ensure_dir(&self.settings.staging_dir).await
    }

    fn context(&self, task_id: &TaskId, total: usize, cancel: CancellationToken) -> RunContext {
        let ttl = self.settings.cache_ttl();
        let header_cache = Arc::new(Cache::new(
            "origin-headers",
            self.settings.cache_max_size,
            ttl,
        ));
        RunContext {
            task_id: task_id.clone(),
            download: DownloadWorker::new(
                Arc::clone(&self.fetcher),
                ContentValidator::from_settings(&self.settings),
                self.origin_headers.clone(),
                header_cache,
                &self.settings.staging_dir,
                self.settings.download_timeout(),
            )
            .with_optimizer(ImageOptimizer::from_settings(&self.settings)),
            upload: UploadWorker::new(Arc::clone(&self.storage)),
            retry: self.retry,
            semaphore: Arc::new(Semaphore::new(self.settings.max_concurrent_downloads)),
            checksum_memo: Cache::new("checksum-memo", self.settings.cache_max_size, ttl),
            known_bad: KnownBadUrls::new(),
            cancel,
            deduplicated: AtomicUsize::new(0),
            reporter: Arc::clone(&self.reporter),
            total,
            settled: AtomicUsize::new(0),
        }
    }

    /// Migrate every image linked from `document`.
    ///
    /// A checkpoint saved under `task_id` by an earlier run for the same
    /// document is resumed: completed images are not fetched again.
    ///
    /// Per-image failures end up in the report. An error is returned only for
    /// invalid configuration, before any image is touched, or when storage
    /// turns out to be misconfigured mid-run. In the latter case no report is
    /// produced; the checkpoint is saved so a rerun with fixed configuration
    /// resumes where this one stopped.
    pub async fn run(
        &self,
        task_id: &TaskId,
        document: &str,
        cancel: CancellationToken,
    ) -> Result<MigrationReport, MigrationError> {
        if let Err(e) = self.prepare().await {
            tracing::error!(target: "mdimg.pipeline", task_id = %task_id, error = %e, "Migration aborted");
            self.set_state(PipelineState::Failed { failed: 0 });
            return Err(e);
        }
        self.set_state(PipelineState::Running);

        let extraction = extract_references(document);
        let checkpoint = match self.checkpoints.load(task_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(target: "mdimg.pipeline", task_id = %task_id, error = %e, "Ignoring unreadable checkpoint");
                None
            }
        };
        let plan = plan_tasks(
            task_id,
            document,
            &extraction,
            checkpoint,
            self.settings.max_retries,
        );
        if let Some(reason) = plan.discarded {
            tracing::info!(target: "mdimg.pipeline", task_id = %task_id, reason = ?reason, "Discarding stale checkpoint");
        }

        let mut counters = RunCounters {
            invalid_references: extraction.invalid_count(),
            resumed: plan.resumed,
            ..RunCounters::default()
        };
        let mut tasks = plan.tasks;
        let total = tasks.len();

        tracing::info!(
            target: "mdimg.pipeline",
            task_id = %task_id,
            total,
            resumed = plan.resumed,
            invalid = counters.invalid_references,
            "Starting migration"
        );

        // Workers get a child token so a fatal error can stop the run without
        // cancelling the caller's token.
        let run_cancel = cancel.child_token();
        let ctx = Arc::new(self.context(task_id, total, run_cancel.clone()));

        let mut tally = Tally::default();
        for task in &tasks {
            tally.count(task);
            if let (true, Some(checksum), Some(url)) =
                (task.is_completed(), &task.checksum, &task.public_url)
            {
                ctx.checksum_memo.set(checksum.clone(), url.clone()).await;
            }
        }
        ctx.settled.store(tally.settled, Ordering::Relaxed);
        self.publish(task_id, ProgressStage::Started, total, &tally);

        let mut workers = JoinSet::new();
        let mut outstanding = HashSet::new();
        for (position, task) in tasks.iter().enumerate() {
            if task.status == TaskStatus::Pending {
                outstanding.insert(position);
                workers.spawn(run_task(Arc::clone(&ctx), position, task.clone()));
            }
        }

        let interval = self.settings.checkpoint_interval.max(1);
        let mut since_checkpoint = 0usize;
        let mut fatal: Option<MigrationError> = None;

        while let Some(joined) = workers.join_next().await {
            let settled: SettledTask = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    tracing::error!(target: "mdimg.pipeline", task_id = %task_id, error = %e, "Image worker aborted");
                    continue;
                }
            };
            outstanding.remove(&settled.position);

            if let Some(error) = settled.error.as_ref().filter(|e| e.is_fatal()) {
                if fatal.is_none() {
                    tracing::error!(target: "mdimg.pipeline", task_id = %task_id, error = %error, "Fatal error, stopping run");
                    run_cancel.cancel();
                    fatal = Some(error.clone());
                }
            }

            let interrupted = settled.interrupted();
            if let (true, Some(checksum), Some(url)) = (
                settled.task.is_completed(),
                &settled.task.checksum,
                &settled.task.public_url,
            ) {
                ctx.checksum_memo.set(checksum.clone(), url.clone()).await;
            }
            tally.count(&settled.task);
            ctx.settled.store(tally.settled, Ordering::Relaxed);
            tasks[settled.position] = settled.task;

            if interrupted {
                continue;
            }
            self.publish(task_id, ProgressStage::Settled, total, &tally);

            since_checkpoint += 1;
            if since_checkpoint >= interval {
                since_checkpoint = 0;
                self.save_checkpoint(task_id, document, &tasks).await;
            }
        }

        // Workers that panicked never handed their task back.
        for position in outstanding {
            let task = &mut tasks[position];
            if let Err(e) = task.fail_with("internal error: worker aborted", FailureKind::Io) {
                tracing::error!(target: "mdimg.pipeline", url = %task.url, error = %e, "Illegal task transition");
            }
        }

        counters.deduplicated = ctx.deduplicated.load(Ordering::Relaxed);
        counters.cancelled = cancel.is_cancelled();
        drop(ctx);

        let rewritten = rewrite_document(document, &tasks);
        let report = MigrationReport::new(rewritten, &tasks, counters);

        if report.summary.is_full_success() {
            if let Err(e) = self.checkpoints.clear(task_id).await {
                tracing::warn!(target: "mdimg.pipeline", task_id = %task_id, error = %e, "Failed to clear checkpoint");
            }
        } else {
            self.save_checkpoint(task_id, document, &tasks).await;
        }

        let stage = if counters.cancelled {
            ProgressStage::Cancelled
        } else {
            ProgressStage::Finished
        };
        self.publish(task_id, stage, total, &tally);
        // Observers already have the final event; drop the per-task entries.
        self.reporter.forget(task_id);

        tracing::info!(
            target: "mdimg.pipeline",
            task_id = %task_id,
            total,
            successful = report.summary.successful,
            failed = report.summary.failed.len(),
            placeholders = report.summary.placeholders,
            deduplicated = report.summary.deduplicated,
            cancelled = report.summary.cancelled,
            "Migration finished"
        );

        if let Some(error) = fatal {
            self.set_state(PipelineState::Failed {
                failed: report.summary.failed.len(),
            });
            return Err(error);
        }
        self.set_state(report.state);
        Ok(report)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), MigrationError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        MigrationError::configuration(format!(
            "cannot create staging directory {}: {e}",
            dir.display()
        ))
    })
}
