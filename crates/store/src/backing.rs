//! The backing store: the public object-fetch API.
//!
//! `BackingStore` owns the import queue, the fetcher worker pool, the trace
//! bus, and the local KV cache, and exposes the fetch surface the
//! virtual-filesystem layer drives: trees, blobs, aux data, root trees,
//! prefetch, glob evaluation, and the compare-by-id equivalence check.

use crate::adapter::{FetchMode, NativeStore};
use crate::error::{FetchError, FetchResult};
use crate::fetcher;
use crate::metrics::{self, ImportMetrics, RequestStage};
use crate::proxy;
use crate::queue::ImportQueue;
use crate::request::{
    BlobAuxKind, BlobKind, ImportKind, ImportRequest, RequestKind, TreeAuxKind, TreeKind,
};
use crate::telemetry::{LogEvent, StructuredLogger};
use crate::trace::{ActivityBuffer, TraceBus, TraceEvent, TraceSubscription};
use burrow_core::{
    Blob, BlobAuxData, CachingPolicy, FetchCause, FetchConfig, FetchContext, FetchType, Hash20,
    ObjectComparison, ObjectId, Origin, ProxyHash, RootId, Tree, TreeAuxData,
};
use burrow_localstore::{KeySpace, LocalStore};
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A resolved root tree and the object id it was materialized under.
#[derive(Clone, Debug)]
pub struct RootTreeResult {
    pub tree: Arc<Tree>,
    pub tree_id: ObjectId,
}

/// Files matching a glob evaluation against one revision.
#[derive(Clone, Debug)]
pub struct GlobFilesResult {
    pub files: Vec<String>,
    pub root: RootId,
}

/// Shared state behind the public API, referenced by every worker task.
pub(crate) struct StoreInner {
    pub(crate) config: FetchConfig,
    pub(crate) caching_policy: CachingPolicy,
    pub(crate) store: Arc<dyn NativeStore>,
    pub(crate) local: Arc<LocalStore>,
    pub(crate) queue: ImportQueue,
    pub(crate) trace: TraceBus,
    pub(crate) activity: ActivityBuffer,
    pub(crate) logger: Arc<dyn StructuredLogger>,
    pub(crate) retry_permits: Arc<Semaphore>,
    pub(crate) import_metrics: Arc<ImportMetrics>,
    pub(crate) fetch_path_regex: Option<Regex>,
    pub(crate) last_missing_proxy_log: Mutex<Option<Instant>>,
    pub(crate) is_recording: AtomicBool,
    pub(crate) recorded_paths: Mutex<HashSet<String>>,
    _activity_subscription: TraceSubscription,
}

impl StoreInner {
    /// Load a proxy hash, throttling the missing-hash telemetry and
    /// surfacing the miss as `NotFound`.
    pub(crate) async fn load_proxy(&self, id: &ObjectId) -> FetchResult<ProxyHash> {
        match proxy::load(&self.local, id).await {
            Ok(proxy) => Ok(proxy),
            Err(FetchError::ProxyHashMissing(what)) => {
                self.log_missing_proxy_hash();
                Err(FetchError::NotFound(format!("missing proxy hash for {what}")))
            }
            Err(error) => Err(error),
        }
    }

    pub(crate) async fn load_proxy_batch(&self, ids: &[ObjectId]) -> FetchResult<Vec<ProxyHash>> {
        match proxy::load_batch(&self.local, ids).await {
            Ok(proxies) => Ok(proxies),
            Err(FetchError::ProxyHashMissing(what)) => {
                self.log_missing_proxy_hash();
                Err(FetchError::NotFound(format!("missing proxy hash for {what}")))
            }
            Err(error) => Err(error),
        }
    }

    fn log_missing_proxy_hash(&self) {
        let interval = Duration::from_secs(self.config.missing_proxy_log_interval_secs);
        let now = Instant::now();
        let should_log = {
            let mut last = self
                .last_missing_proxy_log
                .lock()
                .expect("missing proxy log lock poisoned");
            let due = match *last {
                Some(previous) => now.duration_since(previous) >= interval,
                None => true,
            };
            if due {
                *last = Some(now);
            }
            due
        };
        if should_log {
            self.logger.log_event(LogEvent::MissingProxyHash);
        }
    }

    /// Audit record for a backing-store fetch, gated by the configured path
    /// regex, plus checkout-profile recording of non-prefetch blob paths.
    pub(crate) fn log_backing_store_fetch(
        &self,
        proxies: &[ProxyHash],
        kind: RequestKind,
        cause: FetchCause,
    ) {
        if let Some(regex) = &self.fetch_path_regex {
            for proxy in proxies {
                if regex.is_match(proxy.path().as_str()) {
                    tracing::info!(
                        path = %proxy.path(),
                        kind = %kind,
                        cause = ?cause,
                        "backing-store fetch"
                    );
                }
            }
        }

        if kind != RequestKind::Tree
            && self.is_recording.load(Ordering::Relaxed)
            && cause != FetchCause::Prefetch
        {
            let mut recorded = self
                .recorded_paths
                .lock()
                .expect("recorded paths lock poisoned");
            for proxy in proxies {
                recorded.insert(proxy.path().as_str().to_string());
            }
        }
    }

    /// Enqueue an import, publishing queue/finish trace events around the
    /// caller's wait.
    pub(crate) async fn enqueue_and_wait<K: ImportKind>(
        &self,
        id: &ObjectId,
        proxy: ProxyHash,
        ctx: &FetchContext,
        fetch_type: FetchType,
    ) -> FetchResult<K::Response> {
        let request = ImportRequest::new::<K>(id.clone(), proxy.clone(), ctx, fetch_type);
        let unique = request.unique();
        let _pending = self.import_metrics.scope(RequestStage::Pending, K::KIND);

        self.trace
            .publish(TraceEvent::queued(unique, K::KIND, &proxy, ctx));
        let receiver = self.queue.enqueue::<K>(request);
        let result = match receiver.await {
            Ok(result) => result,
            Err(_) => Err(FetchError::DroppedOnShutdown),
        };

        let source = result.as_ref().ok().map(|response| K::source_of(response));
        self.trace
            .publish(TraceEvent::finished(unique, K::KIND, &proxy, ctx, source));
        result
    }

    /// Materialize the tree named by a manifest node.
    ///
    /// The all-zero manifest is the null revision; it is not present in the
    /// store and yields the empty tree. Otherwise try the local cache
    /// first, then flush the adapter (a client may have just written the
    /// tree) and go remote.
    pub(crate) async fn import_tree_manifest_impl(
        &self,
        manifest: Hash20,
        _ctx: &FetchContext,
    ) -> FetchResult<Arc<Tree>> {
        if manifest.is_zero() {
            return Ok(Arc::new(Tree::empty(self.config.case_sensitive)));
        }

        match self.store.get_tree(&manifest, FetchMode::LocalOnly).await {
            Ok(tree) => Ok(Arc::new(tree)),
            Err(_) => {
                self.store.flush().await;
                let mode = if self.config.allow_remote_get_batch {
                    FetchMode::AllowRemote
                } else {
                    FetchMode::RemoteOnly
                };
                self.store.get_tree(&manifest, mode).await.map(Arc::new)
            }
        }
    }

    /// Mint the object id a root tree is materialized under.
    pub(crate) async fn make_root_tree_id(&self, manifest: Hash20) -> FetchResult<ObjectId> {
        proxy::store(
            &self.local,
            &burrow_core::RepoPathBuf::root(),
            manifest,
            self.config.object_id_format,
        )
        .await
    }
}

/// The object-fetch core's public surface.
///
/// Construction spawns the fetcher workers and the activity-buffer
/// subscriber, so it must happen on a Tokio runtime. Call
/// [`BackingStore::shutdown`] to stop the queue and join the workers.
pub struct BackingStore {
    inner: Arc<StoreInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    management: Mutex<Option<JoinHandle<()>>>,
}

impl BackingStore {
    /// Build a backing store over a native adapter and a local KV cache.
    ///
    /// Fails with `InvalidArgument` if the configuration's caching-policy
    /// surfaces disagree or the fetch-path regex does not parse.
    pub fn new(
        config: FetchConfig,
        store: Arc<dyn NativeStore>,
        local: Arc<LocalStore>,
        logger: Arc<dyn StructuredLogger>,
    ) -> FetchResult<Self> {
        config.validate()?;
        metrics::register_metrics();

        let fetch_path_regex = match &config.log_fetch_path_regex {
            Some(pattern) => Some(Regex::new(pattern).map_err(|err| {
                FetchError::InvalidArgument(format!("invalid fetch path regex: {err}"))
            })?),
            None => None,
        };

        let mut num_workers = config.num_fetcher_workers;
        if num_workers == 0 {
            tracing::warn!("configured to use 0 fetcher workers; using one instead");
            num_workers = 1;
        }

        let queue = ImportQueue::new(&config);
        let trace = TraceBus::new(config.trace_bus_capacity);
        let activity = ActivityBuffer::new(config.activity_buffer_size);
        let subscription = trace.subscribe_fn(
            &format!("activity-{}", store.repo_name()),
            {
                let activity = activity.clone();
                move |event| activity.observe(event)
            },
        );
        let retry_permits = Arc::new(Semaphore::new(config.num_retry_workers.max(1)));
        let caching_policy = config.caching_policy;

        let inner = Arc::new(StoreInner {
            caching_policy,
            store,
            local,
            queue,
            trace,
            activity,
            logger,
            retry_permits,
            import_metrics: ImportMetrics::new(),
            fetch_path_regex,
            last_missing_proxy_log: Mutex::new(None),
            is_recording: AtomicBool::new(false),
            recorded_paths: Mutex::new(HashSet::new()),
            _activity_subscription: subscription,
            config,
        });

        let workers: Vec<JoinHandle<()>> = (0..num_workers)
            .map(|_| tokio::spawn(fetcher::run_worker(Arc::clone(&inner))))
            .collect();

        // Periodic management: flush the adapter so freshly-written local
        // data is rescanned. The task exits once the core is gone.
        let management = {
            let interval = Duration::from_secs(inner.config.flush_interval_secs.max(1));
            let inner = Arc::downgrade(&inner);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    match inner.upgrade() {
                        Some(inner) => inner.store.flush().await,
                        None => break,
                    }
                }
            })
        };

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            management: Mutex::new(Some(management)),
        })
    }

    /// Fetch a tree by object id.
    pub async fn get_tree(
        &self,
        id: &ObjectId,
        ctx: &FetchContext,
    ) -> FetchResult<(Arc<Tree>, Origin)> {
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["get_tree"])
            .start_timer();
        let watch = Instant::now();

        let proxy = self.inner.load_proxy(id).await?;
        self.inner
            .log_backing_store_fetch(std::slice::from_ref(&proxy), RequestKind::Tree, ctx.cause);

        if let Ok(tree) = self.inner.store.get_tree(proxy.rev(), FetchMode::LocalOnly).await {
            tracing::debug!(path = %proxy.path(), rev = %proxy.rev(), "tree found in local cache");
            metrics::record_import_success(
                RequestKind::Tree,
                FetchType::Fetch,
                burrow_core::FetchedSource::Local,
                false,
                watch.elapsed(),
            );
            return Ok((Arc::new(tree), Origin::FromDiskCache));
        }

        let (tree, _source) = self
            .inner
            .enqueue_and_wait::<TreeKind>(id, proxy, ctx, FetchType::Fetch)
            .await?;
        Ok((tree, Origin::FromNetworkFetch))
    }

    /// Fetch a blob by object id.
    pub async fn get_blob(
        &self,
        id: &ObjectId,
        ctx: &FetchContext,
    ) -> FetchResult<(Arc<Blob>, Origin)> {
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["get_blob"])
            .start_timer();
        let watch = Instant::now();

        let proxy = self.inner.load_proxy(id).await?;
        self.inner
            .log_backing_store_fetch(std::slice::from_ref(&proxy), RequestKind::Blob, ctx.cause);

        if let Ok(blob) = self.inner.store.get_blob(proxy.rev(), FetchMode::LocalOnly).await {
            tracing::debug!(path = %proxy.path(), rev = %proxy.rev(), "blob found in local cache");
            metrics::record_import_success(
                RequestKind::Blob,
                FetchType::Fetch,
                burrow_core::FetchedSource::Local,
                false,
                watch.elapsed(),
            );
            return Ok((Arc::new(blob), Origin::FromDiskCache));
        }

        let (blob, _source) = self
            .inner
            .enqueue_and_wait::<BlobKind>(id, proxy, ctx, FetchType::Fetch)
            .await?;
        Ok((blob, Origin::FromNetworkFetch))
    }

    /// Fetch blob aux data by object id. Resolves to `None` when the aux
    /// datum is unavailable; the caller may then compute digests from the
    /// blob itself.
    pub async fn get_blob_aux(
        &self,
        id: &ObjectId,
        ctx: &FetchContext,
    ) -> FetchResult<(Option<BlobAuxData>, Origin)> {
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["get_blob_aux"])
            .start_timer();

        let proxy = self.inner.load_proxy(id).await?;
        self.inner.log_backing_store_fetch(
            std::slice::from_ref(&proxy),
            RequestKind::BlobAux,
            ctx.cause,
        );

        if let Ok(aux) = self.inner.store.get_blob_aux(proxy.rev(), true).await {
            return Ok((Some(aux), Origin::FromDiskCache));
        }

        let (aux, _source) = self
            .inner
            .enqueue_and_wait::<BlobAuxKind>(id, proxy, ctx, FetchType::Fetch)
            .await?;
        Ok((aux, Origin::FromNetworkFetch))
    }

    /// Fetch tree aux data by object id. Resolves to `None` when
    /// unavailable.
    pub async fn get_tree_aux(
        &self,
        id: &ObjectId,
        ctx: &FetchContext,
    ) -> FetchResult<(Option<TreeAuxData>, Origin)> {
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["get_tree_aux"])
            .start_timer();

        let proxy = self.inner.load_proxy(id).await?;
        self.inner.log_backing_store_fetch(
            std::slice::from_ref(&proxy),
            RequestKind::TreeAux,
            ctx.cause,
        );

        if let Ok(aux) = self.inner.store.get_tree_aux(proxy.rev(), true).await {
            return Ok((Some(aux), Origin::FromDiskCache));
        }

        let (aux, _source) = self
            .inner
            .enqueue_and_wait::<TreeAuxKind>(id, proxy, ctx, FetchType::Fetch)
            .await?;
        Ok((aux, Origin::FromNetworkFetch))
    }

    /// Resolve a root id to its root tree, caching the commit-to-tree
    /// mapping. A cache hit imports the mapped tree directly without
    /// resolving the manifest node again.
    pub async fn get_root_tree(
        &self,
        root: &RootId,
        ctx: &FetchContext,
    ) -> FetchResult<RootTreeResult> {
        let _timer = metrics::ROOT_TREE_DURATION.start_timer();
        let commit = root.to_binary()?;

        if let Some(bytes) = self
            .inner
            .local
            .get(KeySpace::CommitToTree, commit.as_bytes())
            .await?
        {
            let tree_id = ObjectId::from_bytes(bytes.to_vec());
            let proxy = self.inner.load_proxy(&tree_id).await?;
            let tree = self
                .inner
                .import_tree_manifest_impl(*proxy.rev(), ctx)
                .await?;
            return Ok(RootTreeResult { tree, tree_id });
        }

        let manifest = self
            .inner
            .store
            .get_manifest_node(&commit)
            .await
            .ok_or_else(|| {
                FetchError::NotFound(format!("manifest node could not be found for commit {root}"))
            })?;
        tracing::debug!(commit = %root, manifest = %manifest, "commit has manifest node");

        let tree = self.inner.import_tree_manifest_impl(manifest, ctx).await?;
        let tree_id = self.inner.make_root_tree_id(manifest).await?;
        self.inner
            .local
            .put(KeySpace::CommitToTree, commit.as_bytes(), tree_id.as_bytes())
            .await?;
        tracing::info!(commit = %root, tree = %tree_id, "imported commit root tree");

        Ok(RootTreeResult { tree, tree_id })
    }

    /// Pre-seed the commit-to-tree mapping for a manifest the client just
    /// created. No-op if the commit was already imported.
    pub async fn import_manifest_for_root(
        &self,
        root: &RootId,
        manifest: Hash20,
        ctx: &FetchContext,
    ) -> FetchResult<()> {
        let commit = root.to_binary()?;
        if self
            .inner
            .local
            .get(KeySpace::CommitToTree, commit.as_bytes())
            .await?
            .is_some()
        {
            // Already imported, nothing to do.
            return Ok(());
        }

        let _tree = self.inner.import_tree_manifest_impl(manifest, ctx).await?;
        let tree_id = self.inner.make_root_tree_id(manifest).await?;
        self.inner
            .local
            .put(KeySpace::CommitToTree, commit.as_bytes(), tree_id.as_bytes())
            .await?;
        tracing::info!(commit = %root, manifest = %manifest, tree = %tree_id, "imported manifest for root");
        Ok(())
    }

    /// Enqueue prefetch imports for a batch of blobs.
    ///
    /// No local-existence check: that trade favors latency-oriented
    /// workflows, and prefetch optimizes throughput. The native store will
    /// not refetch data it already holds.
    pub async fn prefetch_blobs(&self, ids: &[ObjectId], ctx: &FetchContext) -> FetchResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["prefetch_blobs"])
            .start_timer();

        let proxies = self.inner.load_proxy_batch(ids).await?;
        self.inner
            .log_backing_store_fetch(&proxies, RequestKind::Blob, ctx.cause);

        let futures: Vec<_> = ids
            .iter()
            .zip(proxies)
            .map(|(id, proxy)| {
                self.inner
                    .enqueue_and_wait::<BlobKind>(id, proxy, ctx, FetchType::Prefetch)
            })
            .collect();
        futures::future::try_join_all(futures).await?;
        Ok(())
    }

    /// Evaluate glob patterns against a revision.
    pub async fn get_glob_files(
        &self,
        root: &RootId,
        globs: &[String],
    ) -> FetchResult<GlobFilesResult> {
        let _timer = metrics::FETCH_API_DURATION
            .with_label_values(&["get_glob_files"])
            .start_timer();

        match self.inner.store.get_glob_files(root, globs).await {
            Ok(files) => {
                metrics::GLOB_FILES_RESULTS
                    .with_label_values(&["success"])
                    .inc();
                Ok(GlobFilesResult {
                    files,
                    root: root.clone(),
                })
            }
            Err(error) => {
                metrics::GLOB_FILES_RESULTS
                    .with_label_values(&["failure"])
                    .inc();
                Err(error)
            }
        }
    }

    /// Compare two object ids for content equivalence.
    ///
    /// Byte-equal ids are identical. Under bijective ids, different bytes
    /// mean different content. Otherwise equal revision hashes mean
    /// identical content, and anything else is unknowable because history
    /// is mixed into the hash.
    pub async fn compare_objects_by_id(&self, one: &ObjectId, two: &ObjectId) -> ObjectComparison {
        // By far the common case, so check it first.
        if one == two {
            return ObjectComparison::Identical;
        }
        if self.inner.config.bijective_object_ids {
            return ObjectComparison::Different;
        }

        let (proxy_one, proxy_two) = match (
            proxy::load(&self.inner.local, one).await,
            proxy::load(&self.inner.local, two).await,
        ) {
            (Ok(one), Ok(two)) => (one, two),
            _ => return ObjectComparison::Unknown,
        };

        if proxy_one.rev() == proxy_two.rev() {
            ObjectComparison::Identical
        } else {
            ObjectComparison::Unknown
        }
    }

    /// Fail every queued (not yet started) import with
    /// "Request forcibly dropped". Returns how many were dropped.
    pub fn drop_all_pending_requests(&self) -> usize {
        let requests = self.inner.queue.combine_and_clear();
        for request in &requests {
            tracing::debug!(kind = %request.kind(), id = %request.id(), "dropping pending request");
            request.fail(FetchError::DroppedOnShutdown);
        }
        requests.len()
    }

    /// Periodic management: flush the adapter so freshly-written local data
    /// becomes visible. Drive this on `flush_interval_secs`.
    pub async fn periodic_management_task(&self) {
        self.inner.store.flush().await;
    }

    /// Begin recording the checkout paths of demand-fetched blobs.
    pub fn start_recording_fetches(&self) {
        self.inner
            .recorded_paths
            .lock()
            .expect("recorded paths lock poisoned")
            .clear();
        self.inner.is_recording.store(true, Ordering::Relaxed);
    }

    /// Stop recording and return the collected paths.
    pub fn stop_recording_fetches(&self) -> HashSet<String> {
        self.inner.is_recording.store(false, Ordering::Relaxed);
        std::mem::take(
            &mut self
                .inner
                .recorded_paths
                .lock()
                .expect("recorded paths lock poisoned"),
        )
    }

    /// Pending or live import count for one request kind.
    pub fn get_import_metric(&self, stage: RequestStage, kind: RequestKind) -> usize {
        self.inner.import_metrics.count(stage, kind)
    }

    /// The caching policy the layer above consults before persisting
    /// fetched objects.
    pub fn caching_policy(&self) -> CachingPolicy {
        self.inner.caching_policy
    }

    /// The activity buffer fed by this store's trace bus.
    pub fn activity_buffer(&self) -> &ActivityBuffer {
        &self.inner.activity
    }

    /// The trace bus, for additional subscribers.
    pub fn trace_bus(&self) -> &TraceBus {
        &self.inner.trace
    }

    /// The repository the adapter serves.
    pub fn repo_name(&self) -> String {
        self.inner.store.repo_name().to_string()
    }

    /// Stop the queue and join the fetcher workers. Queued imports fail
    /// with `DroppedOnShutdown`; in-flight ones resolve first.
    pub async fn shutdown(&self) {
        self.inner.queue.stop();
        if let Some(management) = self
            .management
            .lock()
            .expect("management handle lock poisoned")
            .take()
        {
            management.abort();
        }
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}
