//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the migration engine expects from
//! infrastructure. They contain no implementation details and use only domain
//! types.
//!
//! # Design Rules
//!
//! - No `reqwest` or filesystem types in any signature
//! - Each port has its own small error type; conversion into
//!   [`MigrationError`](crate::MigrationError) decides retryability
//! - Object-safe traits so adapters can be injected as `Arc<dyn ...>`

pub mod checkpoint;
pub mod fetch;
pub mod progress;
pub mod storage;

pub use checkpoint::{CheckpointError, CheckpointStorePort};
pub use fetch::{BufferedBody, FetchError, FetchRequest, FetchResponse, HttpFetcher, ResponseBody};
pub use progress::{NoopObserver, ObserverError, ProgressObserver};
pub use storage::{StorageError, StoragePort};
