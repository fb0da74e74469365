//! The native object-store adapter surface consumed by the fetch core.
//!
//! The adapter wraps the source-control client's native store: a
//! batch-capable facade over the local object cache and the remote
//! content-addressed store. The core drives it; it never speaks the remote
//! protocol itself. The adapter is expected to enforce its own timeouts and
//! surface failures as errors.

use crate::error::FetchResult;
use async_trait::async_trait;
use burrow_core::{
    Blob, BlobAuxData, FetchCause, FetchedSource, Hash20, RootId, Tree, TreeAuxData,
};

/// Cache policy for one adapter call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// Only consult the local object cache.
    LocalOnly,
    /// Only consult the remote store.
    RemoteOnly,
    /// Consult the cache, fall back to remote.
    AllowRemote,
    /// Like `AllowRemote`, with prefetch-friendly remote batching.
    AllowRemotePrefetch,
}

impl FetchMode {
    /// The fetched-source tag a success under this mode earns. Modes that
    /// let the adapter pick do not say which side answered.
    pub fn fetched_source(self) -> FetchedSource {
        match self {
            FetchMode::LocalOnly => FetchedSource::Local,
            FetchMode::RemoteOnly => FetchedSource::Remote,
            FetchMode::AllowRemote | FetchMode::AllowRemotePrefetch => FetchedSource::Unknown,
        }
    }
}

/// One entry of a batched adapter call. Requests for the same revision hash
/// with distinct causes are both passed through, as the cause can change
/// adapter behavior.
#[derive(Clone, Debug)]
pub struct NativeRequest {
    pub rev: Hash20,
    pub cause: FetchCause,
}

/// Synchronous-per-call, batch-capable facade over the native source-control
/// store.
///
/// Batch calls return one result per request, positionally aligned with the
/// request slice. Thread-safe; driven concurrently from every fetcher
/// worker.
#[async_trait]
pub trait NativeStore: Send + Sync + 'static {
    async fn get_tree(&self, rev: &Hash20, mode: FetchMode) -> FetchResult<Tree>;

    async fn get_tree_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<Tree>>;

    async fn get_blob(&self, rev: &Hash20, mode: FetchMode) -> FetchResult<Blob>;

    async fn get_blob_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<Blob>>;

    async fn get_tree_aux(&self, rev: &Hash20, local_only: bool) -> FetchResult<TreeAuxData>;

    async fn get_tree_aux_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<TreeAuxData>>;

    async fn get_blob_aux(&self, rev: &Hash20, local_only: bool) -> FetchResult<BlobAuxData>;

    async fn get_blob_aux_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<BlobAuxData>>;

    /// Resolve a commit id to its root manifest node.
    async fn get_manifest_node(&self, commit: &Hash20) -> Option<Hash20>;

    /// Evaluate glob patterns against a revision.
    async fn get_glob_files(&self, root: &RootId, globs: &[String]) -> FetchResult<Vec<String>>;

    /// Write out pending state and rescan local indexes, so that data a
    /// client just wrote becomes visible.
    async fn flush(&self);

    fn repo_name(&self) -> &str;

    /// Whether this host is tagged for dogfooding telemetry buckets.
    fn dogfooding_host(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_mode_source_tags() {
        assert_eq!(FetchMode::LocalOnly.fetched_source(), FetchedSource::Local);
        assert_eq!(FetchMode::RemoteOnly.fetched_source(), FetchedSource::Remote);
        assert_eq!(
            FetchMode::AllowRemote.fetched_source(),
            FetchedSource::Unknown
        );
        assert_eq!(
            FetchMode::AllowRemotePrefetch.fetched_source(),
            FetchedSource::Unknown
        );
    }
}
