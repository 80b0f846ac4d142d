//! Run outcome and report types.
//!
//! A [`MigrationReport`] is built once, after the barrier at the end of a
//! run, from the final task list. It is the only thing callers need to
//! present results.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::FailureKind;
use crate::task::{ImageTask, TaskStatus};

/// Lifecycle of a pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    /// Every image was migrated (placeholders aside).
    Completed,
    /// At least one image failed, or the run was cancelled.
    Failed {
        /// Number of images that failed.
        failed: usize,
    },
}

impl PipelineState {
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Final result for one source URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub success: bool,
    /// New URL on success, otherwise a human-readable reason.
    pub detail: String,
}

/// A source URL that could not be migrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedImage {
    pub url: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

/// Counters that are tracked outside the task list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub invalid_references: usize,
    pub deduplicated: usize,
    pub resumed: usize,
    pub cancelled: bool,
}

/// Aggregate statistics for a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Valid image references (one task each).
    pub total: usize,
    pub successful: usize,
    pub failed: Vec<FailedImage>,
    /// Links skipped before any task was created.
    pub invalid_references: usize,
    /// Tracking placeholders skipped during validation.
    pub placeholders: usize,
    pub corrupt: usize,
    /// Tasks whose upload was short-circuited by an identical checksum.
    pub deduplicated: usize,
    /// Tasks carried over as completed from a checkpoint.
    pub resumed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    /// Summarise a settled task list.
    #[must_use]
    pub fn from_tasks(tasks: &[ImageTask], counters: RunCounters) -> Self {
        let mut summary = Self {
            total: tasks.len(),
            invalid_references: counters.invalid_references,
            deduplicated: counters.deduplicated,
            resumed: counters.resumed,
            cancelled: counters.cancelled,
            ..Self::default()
        };

        for task in tasks {
            match task.status {
                TaskStatus::Completed => summary.successful += 1,
                TaskStatus::Error => match task.failure_kind {
                    Some(FailureKind::Placeholder) => summary.placeholders += 1,
                    kind => {
                        if kind == Some(FailureKind::Corrupt) {
                            summary.corrupt += 1;
                        }
                        summary.failed.push(FailedImage {
                            url: task.url.clone(),
                            reason: task
                                .error
                                .clone()
                                .unwrap_or_else(|| "unknown error".to_string()),
                            kind,
                        });
                    }
                },
                _ => {}
            }
        }
        summary
    }

    /// Terminal pipeline state implied by this summary.
    #[must_use]
    pub fn final_state(&self) -> PipelineState {
        if self.failed.is_empty() && !self.cancelled {
            PipelineState::Completed
        } else {
            PipelineState::Failed {
                failed: self.failed.len(),
            }
        }
    }

    /// True when nothing needs to be retried by a later run.
    #[must_use]
    pub fn is_full_success(&self) -> bool {
        self.final_state() == PipelineState::Completed
    }
}

/// Per-URL outcomes in document order.
///
/// Duplicate references collapse onto one entry; a success for any occurrence
/// wins over a failure of another.
#[must_use]
pub fn collect_outcomes(tasks: &[ImageTask]) -> IndexMap<String, ImageOutcome> {
    let mut outcomes: IndexMap<String, ImageOutcome> = IndexMap::new();
    for task in tasks {
        let outcome = match (task.status, task.public_url.as_ref()) {
            (TaskStatus::Completed, Some(url)) => ImageOutcome {
                success: true,
                detail: url.clone(),
            },
            (TaskStatus::Error, _) => ImageOutcome {
                success: false,
                detail: task
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            _ => ImageOutcome {
                success: false,
                detail: "not migrated (run interrupted)".to_string(),
            },
        };

        match outcomes.get_mut(&task.url) {
            Some(existing) if !existing.success && outcome.success => *existing = outcome,
            Some(_) => {}
            None => {
                outcomes.insert(task.url.clone(), outcome);
            }
        }
    }
    outcomes
}

/// Everything a run produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// The rewritten document.
    pub document: String,
    pub outcomes: IndexMap<String, ImageOutcome>,
    pub summary: RunSummary,
    pub state: PipelineState,
}

impl MigrationReport {
    /// Assemble the report for a settled task list.
    #[must_use]
    pub fn new(document: String, tasks: &[ImageTask], counters: RunCounters) -> Self {
        let summary = RunSummary::from_tasks(tasks, counters);
        let state = summary.final_state();
        Self {
            document,
            outcomes: collect_outcomes(tasks),
            summary,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{MigrationError, ValidationFailure};

    fn completed(url: &str, public: &str) -> ImageTask {
        let mut t = ImageTask::for_test(&format!("![]({url})"), url);
        t.begin_download().unwrap();
        t.begin_validation().unwrap();
        t.begin_upload("sum", "image/png", 1).unwrap();
        t.complete(public).unwrap();
        t
    }

    fn failed(url: &str, err: &MigrationError) -> ImageTask {
        let mut t = ImageTask::for_test(&format!("![]({url})"), url);
        t.begin_download().unwrap();
        t.fail(err).unwrap();
        t
    }

    #[test]
    fn test_summary_counts_and_state() {
        let tasks = vec![
            completed("http://h/a.png", "N1"),
            completed("http://h/b.png", "N2"),
            failed("http://h/c.png", &MigrationError::http_status(404)),
        ];
        let report = MigrationReport::new(String::new(), &tasks, RunCounters::default());

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.successful, 2);
        assert_eq!(report.summary.failed.len(), 1);
        assert!(report.summary.failed[0].reason.contains("404"));
        assert_eq!(report.state, PipelineState::Failed { failed: 1 });
        let keys: Vec<_> = report.outcomes.keys().cloned().collect();
        assert_eq!(keys, vec!["http://h/a.png", "http://h/b.png", "http://h/c.png"]);
    }

    #[test]
    fn test_placeholders_are_not_failures() {
        let tasks = vec![
            completed("http://h/a.png", "N1"),
            failed(
                "http://h/pixel.svg",
                &MigrationError::validation(ValidationFailure::Placeholder, "1x1"),
            ),
            failed(
                "http://h/broken.png",
                &MigrationError::validation(ValidationFailure::Corrupt, "eof"),
            ),
        ];
        let summary = RunSummary::from_tasks(&tasks, RunCounters::default());
        assert_eq!(summary.placeholders, 1);
        assert_eq!(summary.corrupt, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].kind, Some(FailureKind::Corrupt));
    }

    #[test]
    fn test_cancelled_run_is_failed() {
        let tasks = vec![ImageTask::for_test("![](http://h/a.png)", "http://h/a.png")];
        let counters = RunCounters {
            cancelled: true,
            ..RunCounters::default()
        };
        let report = MigrationReport::new(String::new(), &tasks, counters);
        assert_eq!(report.state, PipelineState::Failed { failed: 0 });
        assert!(!report.outcomes["http://h/a.png"].success);
    }

    #[test]
    fn test_duplicate_urls_prefer_success() {
        let tasks = vec![
            failed("http://h/a.png", &MigrationError::network("reset")),
            completed("http://h/a.png", "N1"),
        ];
        let outcomes = collect_outcomes(&tasks);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes["http://h/a.png"].success);
    }
}
