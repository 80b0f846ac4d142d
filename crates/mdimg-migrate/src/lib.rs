//! Image migration engine for mdimg.
//!
//! Implements the ports defined in `mdimg-core` and wires them into a
//! concurrent pipeline:
//!
//! - `download` - per-attempt fetching, origin headers and staging
//! - `validate` - content sniffing, decoding and placeholder detection
//! - `optimize` - optional resize and recompression after validation
//! - `upload` - staged file to storage
//! - `pipeline` - the orchestrator tying it all together
//! - `state` - checkpoint files for resumable runs
//! - `progress` - progress fan-out to observers and channels
//! - `retry`, `cache` - backoff policy and the bounded TTL cache

// Re-export core types for convenience
pub use mdimg_core::{
    MigrationError, MigrationReport, MigrationSettings, PipelineState, ProgressEvent, TaskId,
};

mod atomic;

pub mod cache;
pub mod download;
pub mod http;
pub mod optimize;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod state;
pub mod upload;
pub mod validate;

pub use cache::{Cache, CacheStats};
pub use download::{
    DownloadWorker, FetchedPayload, KnownBadUrls, OriginHeaders, OriginRule, StagedImage,
};
pub use http::ReqwestFetcher;
pub use optimize::{ImageOptimizer, Optimized};
pub use pipeline::{MigrationPipeline, PipelineDeps};
pub use progress::{ProgressReporter, ProgressThrottle};
pub use retry::RetryPolicy;
pub use state::{FileCheckpointStore, MemoryCheckpointStore};
pub use upload::UploadWorker;
pub use validate::{ContentValidator, ImageKind, ValidationError};
