//! Terminal rendering for CLI output.

mod progress;
mod summary;

pub use progress::BarObserver;
pub use summary::{print_extraction, print_summary, truncate_url};
