//! Command handlers.
//!
//! Handlers are thin: they read CLI input, call into the composed
//! [`CliContext`](crate::bootstrap::CliContext) and format output for the
//! terminal. Migration logic lives in `mdimg-migrate`.

pub mod check_config;
pub mod clear_state;
pub mod delete_object;
pub mod extract;
pub mod migrate;
