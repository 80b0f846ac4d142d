//! Progress fan-out.
//!
//! [`ProgressReporter`] delivers each published event synchronously to every
//! registered [`ProgressObserver`] and to any broadcast channel subscribers.
//!
//! # Design
//!
//! - An observer that errors or panics is logged and skipped; publishing
//!   never fails
//! - Channel subscribers that lag or disconnect miss events, nothing is
//!   replayed
//! - The reporter remembers only the last event per task id

mod throttle;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;

use mdimg_core::{ProgressEvent, ProgressObserver, TaskId};

pub use throttle::ProgressThrottle;

/// Default capacity of the broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Publishes progress events to observers and channel subscribers.
pub struct ProgressReporter {
    observers: RwLock<Vec<Arc<dyn ProgressObserver>>>,
    sender: broadcast::Sender<ProgressEvent>,
    latest: Mutex<HashMap<TaskId, ProgressEvent>>,
    throttles: Mutex<HashMap<TaskId, ProgressThrottle>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ProgressReporter")
            .field("observers", &observers)
            .field("channel_subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: RwLock::new(Vec::new()),
            sender,
            latest: Mutex::new(HashMap::new()),
            throttles: Mutex::new(HashMap::new()),
        }
    }

    /// Register an observer for all future events.
    pub fn subscribe(&self, observer: Arc<dyn ProgressObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Receive future events through a channel.
    #[must_use]
    pub fn subscribe_channel(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Last event published for `task_id`.
    #[must_use]
    pub fn latest(&self, task_id: &TaskId) -> Option<ProgressEvent> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Drop remembered state for `task_id`.
    pub fn forget(&self, task_id: &TaskId) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        self.throttles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
    }

    /// Publish `event`. Intermediate stage events may be throttled.
    ///
    /// Returns true if the event was delivered.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let emit = self
            .throttles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.task_id.clone())
            .or_default()
            .should_emit(event.stage());
        if !emit {
            return false;
        }

        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.task_id.clone(), event.clone());

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_progress(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        target: "mdimg.progress",
                        task_id = %event.task_id,
                        error = %e,
                        "Progress observer failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        target: "mdimg.progress",
                        task_id = %event.task_id,
                        "Progress observer panicked"
                    );
                }
            }
        }

        // No receivers is not an error.
        let _ = self.sender.send(event);
        true
    }
}
