use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use mdimg_core::{ProgressDetails, ProgressEvent, ProgressStage, TaskId};

use crate::cache::Cache;
use crate::download::{DownloadWorker, KnownBadUrls};
use crate::progress::ProgressReporter;
use crate::retry::RetryPolicy;
use crate::upload::UploadWorker;

/// State shared by the workers of one `run` call.
///
/// Created when the run starts and dropped once every worker has settled, so
/// nothing cached here leaks into the next run.
pub(crate) struct RunContext {
    pub task_id: TaskId,
    pub download: DownloadWorker,
    pub upload: UploadWorker,
    pub retry: RetryPolicy,
    pub semaphore: Arc<Semaphore>,
    /// SHA-256 checksum to public URL of content already uploaded this run.
    pub checksum_memo: Cache<String, String>,
    pub known_bad: KnownBadUrls,
    pub cancel: CancellationToken,
    pub deduplicated: AtomicUsize,
    pub reporter: Arc<ProgressReporter>,
    /// Number of tasks in the run.
    pub total: usize,
    /// Tasks settled so far, kept current by the settle loop.
    pub settled: AtomicUsize,
}

impl RunContext {
    /// Publish an intermediate per-image event. These are throttled.
    pub fn report_stage(&self, stage: ProgressStage, url: &str) {
        let current = self.settled.load(Ordering::Relaxed);
        let verb = match stage {
            ProgressStage::Downloading => "Downloading",
            ProgressStage::Validating => "Validating",
            ProgressStage::Uploading => "Uploading",
            _ => "Processing",
        };
        self.reporter.publish(ProgressEvent::new(
            self.task_id.clone(),
            format!("{verb} {url}"),
            ProgressDetails {
                total: self.total,
                current,
                stage: Some(stage),
                url: Some(url.to_string()),
                ..ProgressDetails::default()
            },
        ));
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("task_id", &self.task_id)
            .field("download", &self.download)
            .field("retry", &self.retry)
            .field("permits", &self.semaphore.available_permits())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
