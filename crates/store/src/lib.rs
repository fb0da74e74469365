//! Object-fetch core for Burrow.
//!
//! This crate bridges the virtual filesystem to the remote source-control
//! object store:
//! - A priority-ordered, cause-tagged import request queue with
//!   de-duplication by object id
//! - A fetcher worker pool driving staged LocalOnly/RemoteOnly/retry
//!   batches against the native adapter
//! - The public `BackingStore` fetch API (trees, blobs, aux data, root
//!   trees, prefetch, globs, compare-by-id)
//! - A trace bus with a bounded activity buffer, structured telemetry, and
//!   Prometheus metrics

pub mod adapter;
pub mod backing;
pub mod error;
mod fetcher;
pub mod metrics;
pub mod proxy;
pub mod queue;
pub mod request;
pub mod telemetry;
pub mod trace;

pub use adapter::{FetchMode, NativeRequest, NativeStore};
pub use backing::{BackingStore, GlobFilesResult, RootTreeResult};
pub use error::{FetchError, FetchResult};
pub use metrics::{ImportMetrics, RequestStage};
pub use queue::ImportQueue;
pub use request::{
    BlobAuxKind, BlobKind, ImportKind, ImportRequest, RequestKind, TreeAuxKind, TreeKind,
};
pub use telemetry::{FetchMiss, LogEvent, StructuredLogger, TracingLogger};
pub use trace::{ActivityBuffer, TraceBus, TraceEvent, TracePhase, TraceSubscription};
