//! Progress observer port.
//!
//! Observers are called synchronously from the reporter and must not block.
//! Their failures are contained by the reporter.

use thiserror::Error;

use crate::events::ProgressEvent;

/// An observer failed to handle an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("progress observer failed: {0}")]
pub struct ObserverError(pub String);

/// Port for receiving progress events.
///
/// # Example
///
/// ```ignore
/// struct LogObserver;
///
/// impl ProgressObserver for LogObserver {
///     fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
///         println!("{}% {}", event.percent, event.message);
///         Ok(())
///     }
/// }
/// ```
pub trait ProgressObserver: Send + Sync {
    /// Handle one event. Implementations should return quickly.
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError>;
}

/// An observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _event: &ProgressEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}
