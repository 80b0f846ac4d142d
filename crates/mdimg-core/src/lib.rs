//! Core domain types and port definitions for mdimg.
//!
//! This crate has no network or filesystem I/O. It defines what an image
//! migration run is made of (references, tasks, checkpoints, events, reports,
//! settings) and the ports the engine in `mdimg-migrate` is wired through.

#![deny(unused_crate_dependencies)]

pub mod document;
pub mod errors;
pub mod events;
pub mod outcome;
pub mod ports;
pub mod settings;
pub mod task;

// Re-export commonly used types for convenience
pub use document::{
    Extraction, ImageReference, LinkSyntax, SkippedLink, extract_references, retarget_token,
    rewrite_document,
};
pub use errors::{FailureKind, MigrationError, MigrationResult, ValidationFailure};
pub use events::{ProgressDetails, ProgressEvent, ProgressStage};
pub use outcome::{
    FailedImage, ImageOutcome, MigrationReport, PipelineState, RunCounters, RunSummary,
    collect_outcomes,
};
pub use ports::{
    BufferedBody, CheckpointError, CheckpointStorePort, FetchError, FetchRequest, FetchResponse,
    HttpFetcher, NoopObserver, ObserverError, ProgressObserver, ResponseBody, StorageError,
    StoragePort,
};
pub use settings::{
    DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE, MAX_FILE_SIZE_LIMIT, MigrationSettings,
    OptimizeSettings, SettingsError, StorageSettings,
};
pub use task::{
    DiscardReason, ImageTask, InvalidTaskId, TaskId, TaskPlan, TaskState, TaskStatus,
    TransitionError, guess_extension, plan_tasks,
};
