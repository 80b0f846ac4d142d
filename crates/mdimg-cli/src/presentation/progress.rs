//! Progress bar attached to a run as a progress observer.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use mdimg_core::{ObserverError, ProgressEvent, ProgressObserver, ProgressStage};

use super::summary::truncate_url;

const URL_WIDTH: usize = 48;

/// Renders progress events on stderr. Hidden when stderr is not a terminal.
pub struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    pub fn new() -> Self {
        let target = if io::stderr().is_terminal() {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self::with_draw_target(target)
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target);
        bar.set_style(bar_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Position and length of the bar.
    pub fn position(&self) -> (u64, Option<u64>) {
        (self.bar.position(), self.bar.length())
    }

    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Default for BarObserver {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ProgressObserver for BarObserver {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
        let details = &event.details;
        self.bar.set_length(details.total as u64);
        self.bar.set_position(details.current as u64);

        match event.stage() {
            Some(ProgressStage::Finished) => {
                self.bar.finish_with_message(format!(
                    "done: {} migrated, {} failed, {} skipped",
                    details.success, details.failed, details.skipped
                ));
            }
            Some(ProgressStage::Cancelled) => {
                self.bar.abandon_with_message("cancelled");
            }
            _ => {
                let message = details.url.as_deref().map_or_else(
                    || event.message.clone(),
                    |url| truncate_url(url, URL_WIDTH),
                );
                self.bar.set_message(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mdimg_core::{ProgressDetails, TaskId};

    use super::*;

    fn event(stage: ProgressStage, current: usize, total: usize) -> ProgressEvent {
        ProgressEvent::new(
            TaskId::new("t").unwrap(),
            "progress",
            ProgressDetails {
                total,
                current,
                stage: Some(stage),
                url: Some("https://example.com/a.png".to_string()),
                ..ProgressDetails::default()
            },
        )
    }

    #[test]
    fn test_bar_follows_events() {
        let observer = BarObserver::with_draw_target(ProgressDrawTarget::hidden());
        observer.on_progress(&event(ProgressStage::Started, 0, 3)).unwrap();
        assert_eq!(observer.position(), (0, Some(3)));

        observer.on_progress(&event(ProgressStage::Settled, 2, 3)).unwrap();
        assert_eq!(observer.position(), (2, Some(3)));
        assert!(!observer.is_finished());

        observer.on_progress(&event(ProgressStage::Finished, 3, 3)).unwrap();
        assert!(observer.is_finished());
    }
}
