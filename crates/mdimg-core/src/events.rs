//! Progress events published while a run is in flight.
//!
//! Events are plain serializable data so that any transport (terminal bar,
//! websocket, log line) can render them.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Which part of the run an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// Tasks have been planned; nothing has settled yet.
    Started,
    Downloading,
    Validating,
    Uploading,
    /// One image task reached a terminal state.
    Settled,
    /// Every task settled and the document has been rewritten.
    Finished,
    /// The run stopped early because of cancellation.
    Cancelled,
}

impl ProgressStage {
    /// Events that must never be dropped by throttling.
    #[must_use]
    pub const fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Settled | Self::Finished | Self::Cancelled
        )
    }
}

/// Counters attached to every progress event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetails {
    /// Number of image tasks in the run.
    pub total: usize,
    /// Number of tasks settled so far.
    pub current: usize,
    pub success: usize,
    pub failed: usize,
    /// Placeholders and deduplicated uploads.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ProgressStage>,
    /// Image the event is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A progress update for one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub message: String,
    /// Percentage in `0..=100`.
    pub percent: u8,
    pub details: ProgressDetails,
}

impl ProgressEvent {
    /// Build an event, deriving `percent` from `details.current / details.total`.
    ///
    /// An empty run is reported as 100 %.
    #[must_use]
    pub fn new(task_id: TaskId, message: impl Into<String>, details: ProgressDetails) -> Self {
        let percent = percent_of(details.current, details.total);
        Self {
            task_id,
            message: message.into(),
            percent,
            details,
        }
    }

    /// Stage carried in the details, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<ProgressStage> {
        self.details.stage
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent_of(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let clamped = current.min(total) as u128;
    (clamped * 100 / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(current: usize, total: usize) -> ProgressDetails {
        ProgressDetails {
            total,
            current,
            ..ProgressDetails::default()
        }
    }

    #[test]
    fn test_percent_is_derived_and_clamped() {
        let id = TaskId::new("p").unwrap();
        assert_eq!(ProgressEvent::new(id.clone(), "", details(0, 4)).percent, 0);
        assert_eq!(ProgressEvent::new(id.clone(), "", details(1, 3)).percent, 33);
        assert_eq!(ProgressEvent::new(id.clone(), "", details(9, 3)).percent, 100);
        assert_eq!(ProgressEvent::new(id, "", details(0, 0)).percent, 100);
    }

    #[test]
    fn test_event_serializes_to_flat_json() {
        let mut d = details(1, 2);
        d.stage = Some(ProgressStage::Settled);
        let event = ProgressEvent::new(TaskId::new("p").unwrap(), "1/2 images", d);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["task_id"], "p");
        assert_eq!(json["percent"], 50);
        assert_eq!(json["details"]["stage"], "settled");
        assert!(json["details"].get("url").is_none());
    }

    #[test]
    fn test_milestones() {
        assert!(ProgressStage::Settled.is_milestone());
        assert!(!ProgressStage::Downloading.is_milestone());
    }
}
