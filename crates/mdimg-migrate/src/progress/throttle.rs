//! Progress throttling.
//!
//! Rate-limits intermediate progress updates to avoid overwhelming observers
//! with events. Milestone events always pass and restart the interval.

use std::time::Duration;

use mdimg_core::ProgressStage;
use tokio::time::Instant;

/// Rate-limiter for progress updates of one run.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Create a throttle with a default interval of 100ms.
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(100))
    }

    /// Check whether an event of `stage` should go out now.
    pub fn should_emit(&mut self, stage: Option<ProgressStage>) -> bool {
        let now = Instant::now();
        if stage.is_none_or(|s| s.is_milestone()) {
            self.last_emit = Some(now);
            return true;
        }
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}
