//! Shared fixtures: a scripted native-store fake and a recording logger.

#![allow(dead_code)]

use async_trait::async_trait;
use burrow_core::{
    Blob, BlobAuxData, FetchConfig, Hash20, Hash32, ObjectId, ProxyHash, RepoPathBuf, RootId,
    Tree, TreeAuxData,
};
use burrow_localstore::LocalStore;
use burrow_store::{
    BackingStore, FetchError, FetchMode, FetchResult, LogEvent, NativeRequest, NativeStore,
    StructuredLogger,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// One recorded adapter call.
#[derive(Clone, Debug)]
pub struct AdapterCall {
    pub op: &'static str,
    pub mode: FetchMode,
    pub revs: Vec<Hash20>,
}

struct Side<T> {
    local: HashMap<Hash20, T>,
    remote: HashMap<Hash20, T>,
}

impl<T> Default for Side<T> {
    fn default() -> Self {
        Self {
            local: HashMap::new(),
            remote: HashMap::new(),
        }
    }
}

impl<T: Clone> Side<T> {
    fn lookup(&self, rev: &Hash20, mode: FetchMode) -> Option<T> {
        match mode {
            FetchMode::LocalOnly => self.local.get(rev).cloned(),
            FetchMode::RemoteOnly => self.remote.get(rev).cloned(),
            FetchMode::AllowRemote | FetchMode::AllowRemotePrefetch => self
                .local
                .get(rev)
                .or_else(|| self.remote.get(rev))
                .cloned(),
        }
    }
}

/// Scripted in-memory native store.
///
/// Objects are seeded per side (local / remote); every call is recorded for
/// assertions. `flush` promotes pending-local objects, modeling a client
/// that just wrote data the adapter only sees after a rescan. The gate, when
/// enabled, parks batch calls until the test releases permits.
pub struct FakeNativeStore {
    repo: String,
    blobs: Mutex<Side<Bytes>>,
    trees: Mutex<Side<Tree>>,
    blob_aux: Mutex<Side<BlobAuxData>>,
    tree_aux: Mutex<Side<TreeAuxData>>,
    manifests: Mutex<HashMap<Hash20, Hash20>>,
    globs: Mutex<HashMap<String, Vec<String>>>,
    pending_local_blobs: Mutex<HashMap<Hash20, Bytes>>,
    pending_local_trees: Mutex<HashMap<Hash20, Tree>>,
    calls: Mutex<Vec<AdapterCall>>,
    flushes: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
    dogfooding: bool,
}

impl FakeNativeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            repo: "fixture".to_string(),
            blobs: Mutex::new(Side::default()),
            trees: Mutex::new(Side::default()),
            blob_aux: Mutex::new(Side::default()),
            tree_aux: Mutex::new(Side::default()),
            manifests: Mutex::new(HashMap::new()),
            globs: Mutex::new(HashMap::new()),
            pending_local_blobs: Mutex::new(HashMap::new()),
            pending_local_trees: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            dogfooding: false,
        })
    }

    pub fn insert_local_blob(&self, rev: Hash20, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .local
            .insert(rev, Bytes::copy_from_slice(data));
    }

    pub fn insert_remote_blob(&self, rev: Hash20, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .remote
            .insert(rev, Bytes::copy_from_slice(data));
    }

    /// Seed a blob that only becomes locally visible after a flush.
    pub fn insert_pending_local_blob(&self, rev: Hash20, data: &[u8]) {
        self.pending_local_blobs
            .lock()
            .unwrap()
            .insert(rev, Bytes::copy_from_slice(data));
    }

    pub fn insert_local_tree(&self, rev: Hash20, tree: Tree) {
        self.trees.lock().unwrap().local.insert(rev, tree);
    }

    pub fn insert_remote_tree(&self, rev: Hash20, tree: Tree) {
        self.trees.lock().unwrap().remote.insert(rev, tree);
    }

    pub fn insert_pending_local_tree(&self, rev: Hash20, tree: Tree) {
        self.pending_local_trees.lock().unwrap().insert(rev, tree);
    }

    pub fn insert_local_blob_aux(&self, rev: Hash20, aux: BlobAuxData) {
        self.blob_aux.lock().unwrap().local.insert(rev, aux);
    }

    pub fn insert_remote_blob_aux(&self, rev: Hash20, aux: BlobAuxData) {
        self.blob_aux.lock().unwrap().remote.insert(rev, aux);
    }

    pub fn insert_local_tree_aux(&self, rev: Hash20, aux: TreeAuxData) {
        self.tree_aux.lock().unwrap().local.insert(rev, aux);
    }

    pub fn insert_remote_tree_aux(&self, rev: Hash20, aux: TreeAuxData) {
        self.tree_aux.lock().unwrap().remote.insert(rev, aux);
    }

    pub fn set_manifest(&self, commit: Hash20, manifest: Hash20) {
        self.manifests.lock().unwrap().insert(commit, manifest);
    }

    pub fn set_glob_files(&self, root: &RootId, files: Vec<String>) {
        self.globs.lock().unwrap().insert(root.render(), files);
    }

    /// Park batch calls until `release` grants permits.
    pub fn set_gated(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<AdapterCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == op)
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str, mode: FetchMode, revs: Vec<Hash20>) {
        self.calls.lock().unwrap().push(AdapterCall { op, mode, revs });
    }

    async fn wait_gate(&self) {
        if self.gated.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
        }
    }

    fn miss(rev: &Hash20) -> FetchError {
        FetchError::NotFound(format!("object {rev} not available"))
    }
}

#[async_trait]
impl NativeStore for FakeNativeStore {
    async fn get_tree(&self, rev: &Hash20, mode: FetchMode) -> FetchResult<Tree> {
        self.record("get_tree", mode, vec![*rev]);
        self.trees
            .lock()
            .unwrap()
            .lookup(rev, mode)
            .ok_or_else(|| Self::miss(rev))
    }

    async fn get_tree_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<Tree>> {
        self.wait_gate().await;
        self.record(
            "get_tree_batch",
            mode,
            requests.iter().map(|r| r.rev).collect(),
        );
        let trees = self.trees.lock().unwrap();
        requests
            .iter()
            .map(|request| {
                trees
                    .lookup(&request.rev, mode)
                    .ok_or_else(|| Self::miss(&request.rev))
            })
            .collect()
    }

    async fn get_blob(&self, rev: &Hash20, mode: FetchMode) -> FetchResult<Blob> {
        self.record("get_blob", mode, vec![*rev]);
        self.blobs
            .lock()
            .unwrap()
            .lookup(rev, mode)
            .map(Blob::new)
            .ok_or_else(|| Self::miss(rev))
    }

    async fn get_blob_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<Blob>> {
        self.wait_gate().await;
        self.record(
            "get_blob_batch",
            mode,
            requests.iter().map(|r| r.rev).collect(),
        );
        let blobs = self.blobs.lock().unwrap();
        requests
            .iter()
            .map(|request| {
                blobs
                    .lookup(&request.rev, mode)
                    .map(Blob::new)
                    .ok_or_else(|| Self::miss(&request.rev))
            })
            .collect()
    }

    async fn get_tree_aux(&self, rev: &Hash20, local_only: bool) -> FetchResult<TreeAuxData> {
        let mode = if local_only {
            FetchMode::LocalOnly
        } else {
            FetchMode::AllowRemote
        };
        self.record("get_tree_aux", mode, vec![*rev]);
        self.tree_aux
            .lock()
            .unwrap()
            .lookup(rev, mode)
            .ok_or_else(|| Self::miss(rev))
    }

    async fn get_tree_aux_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<TreeAuxData>> {
        self.wait_gate().await;
        self.record(
            "get_tree_aux_batch",
            mode,
            requests.iter().map(|r| r.rev).collect(),
        );
        let auxes = self.tree_aux.lock().unwrap();
        requests
            .iter()
            .map(|request| {
                auxes
                    .lookup(&request.rev, mode)
                    .ok_or_else(|| Self::miss(&request.rev))
            })
            .collect()
    }

    async fn get_blob_aux(&self, rev: &Hash20, local_only: bool) -> FetchResult<BlobAuxData> {
        let mode = if local_only {
            FetchMode::LocalOnly
        } else {
            FetchMode::AllowRemote
        };
        self.record("get_blob_aux", mode, vec![*rev]);
        self.blob_aux
            .lock()
            .unwrap()
            .lookup(rev, mode)
            .ok_or_else(|| Self::miss(rev))
    }

    async fn get_blob_aux_batch(
        &self,
        requests: &[NativeRequest],
        mode: FetchMode,
    ) -> Vec<FetchResult<BlobAuxData>> {
        self.wait_gate().await;
        self.record(
            "get_blob_aux_batch",
            mode,
            requests.iter().map(|r| r.rev).collect(),
        );
        let auxes = self.blob_aux.lock().unwrap();
        requests
            .iter()
            .map(|request| {
                auxes
                    .lookup(&request.rev, mode)
                    .ok_or_else(|| Self::miss(&request.rev))
            })
            .collect()
    }

    async fn get_manifest_node(&self, commit: &Hash20) -> Option<Hash20> {
        self.record("get_manifest_node", FetchMode::LocalOnly, vec![*commit]);
        self.manifests.lock().unwrap().get(commit).copied()
    }

    async fn get_glob_files(&self, root: &RootId, _globs: &[String]) -> FetchResult<Vec<String>> {
        self.globs
            .lock()
            .unwrap()
            .get(&root.render())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("no glob results for {root}")))
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let pending: Vec<_> = self
            .pending_local_blobs
            .lock()
            .unwrap()
            .drain()
            .collect();
        let mut blobs = self.blobs.lock().unwrap();
        for (rev, data) in pending {
            blobs.local.insert(rev, data);
        }
        drop(blobs);
        let pending: Vec<_> = self
            .pending_local_trees
            .lock()
            .unwrap()
            .drain()
            .collect();
        let mut trees = self.trees.lock().unwrap();
        for (rev, tree) in pending {
            trees.local.insert(rev, tree);
        }
    }

    fn repo_name(&self) -> &str {
        &self.repo
    }

    fn dogfooding_host(&self) -> bool {
        self.dogfooding
    }
}

/// Logger that captures structured events for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn fetch_misses(&self) -> Vec<burrow_store::FetchMiss> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LogEvent::FetchMiss(miss) => Some(miss),
                LogEvent::MissingProxyHash => None,
            })
            .collect()
    }
}

impl StructuredLogger for RecordingLogger {
    fn log_event(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Deterministic 20-byte hash from a marker byte.
pub fn rev(marker: u8) -> Hash20 {
    Hash20::from_bytes([marker; 20])
}

pub fn hash32(marker: u8) -> Hash32 {
    Hash32::from_bytes([marker; 32])
}

/// Embedded hash-only object id for a revision.
pub fn hash_only_id(marker: u8) -> ObjectId {
    ProxyHash::embed_hash_only(rev(marker))
}

/// Embedded with-path object id.
pub fn with_path_id(marker: u8, path: &str) -> ObjectId {
    ProxyHash::embed_with_path(rev(marker), &RepoPathBuf::new(path).unwrap())
}

pub fn blob_aux(marker: u8, size: u64) -> BlobAuxData {
    BlobAuxData {
        sha1: rev(marker),
        blake3: hash32(marker),
        size,
    }
}

pub fn tree_aux(marker: u8, size: u64) -> TreeAuxData {
    TreeAuxData {
        digest_hash: hash32(marker),
        digest_size: size,
    }
}

/// Build a backing store over fresh fixtures with the test configuration.
pub fn build_store(
    config: FetchConfig,
) -> (
    BackingStore,
    Arc<FakeNativeStore>,
    Arc<LocalStore>,
    Arc<RecordingLogger>,
) {
    let fake = FakeNativeStore::new();
    let local = Arc::new(LocalStore::new_memory());
    let logger = RecordingLogger::new();
    let store = BackingStore::new(
        config,
        fake.clone() as Arc<dyn NativeStore>,
        local.clone(),
        logger.clone() as Arc<dyn StructuredLogger>,
    )
    .expect("backing store construction failed");
    (store, fake, local, logger)
}
