//! The import request queue.
//!
//! A single multi-producer, multi-consumer queue shared by every caller and
//! fetcher worker. Requests are grouped by kind, ordered by priority with
//! FIFO tie-breaks, and de-duplicated by object id: a second enqueue for an
//! outstanding id attaches another sink to the pending import instead of
//! queueing a duplicate.

use crate::error::{FetchError, FetchResult};
use crate::request::{
    BlobAuxKind, BlobKind, ImportKind, ImportRequest, RequestKind, TreeAuxKind, TreeKind,
};
use burrow_core::{
    Blob, BlobAuxData, FetchConfig, FetchedSource, ImportPriority, ObjectId, Tree, TreeAuxData,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot};

/// Per-kind dequeue batch limits.
#[derive(Clone, Copy, Debug)]
struct BatchSizes {
    blob: usize,
    tree: usize,
    aux: usize,
}

impl BatchSizes {
    fn for_kind(self, kind: RequestKind) -> usize {
        let size = match kind {
            RequestKind::Blob => self.blob,
            RequestKind::Tree => self.tree,
            RequestKind::BlobAux | RequestKind::TreeAux => self.aux,
        };
        size.max(1)
    }
}

struct QueueEntry {
    seq: u64,
    request: Arc<ImportRequest>,
}

struct QueueState {
    running: bool,
    next_seq: u64,
    queues: [Vec<QueueEntry>; 4],
    /// Outstanding imports by (kind, id). Entries stay here while the
    /// import is in flight so that concurrent requesters de-duplicate onto
    /// it; `mark_finished` removes them.
    tracker: HashMap<(RequestKind, ObjectId), Arc<ImportRequest>>,
}

/// Priority-ordered, cause-tagged queue of pending import requests.
pub struct ImportQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    batch_sizes: BatchSizes,
}

impl ImportQueue {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                running: true,
                next_seq: 0,
                queues: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
                tracker: HashMap::new(),
            }),
            notify: Notify::new(),
            batch_sizes: BatchSizes {
                blob: config.import_batch_size,
                tree: config.import_batch_size_tree,
                aux: config.import_batch_size_aux,
            },
        }
    }

    /// Enqueue an import request and return the caller's completion sink.
    ///
    /// If an import for the same (kind, id) is already outstanding, the new
    /// sink attaches to it and the pending import's priority is raised to
    /// the higher of the two. After `stop` the sink resolves immediately
    /// with `DroppedOnShutdown`.
    pub fn enqueue<K: ImportKind>(
        &self,
        request: ImportRequest,
    ) -> oneshot::Receiver<FetchResult<K::Response>> {
        debug_assert_eq!(request.kind(), K::KIND);
        let (sender, receiver) = oneshot::channel();

        {
            let mut state = self.state.lock().expect("import queue lock poisoned");
            if !state.running {
                drop(state);
                let _ = sender.send(Err(FetchError::DroppedOnShutdown));
                return receiver;
            }

            let key = (K::KIND, request.id().clone());
            if let Some(existing) = state.tracker.get(&key) {
                existing.bump_priority(request.priority());
                existing.push_sink::<K>(sender);
                return receiver;
            }

            request.push_sink::<K>(sender);
            let request = Arc::new(request);
            state.tracker.insert(key, Arc::clone(&request));
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queues[K::KIND.index()].push(QueueEntry { seq, request });
        }

        self.notify.notify_one();
        receiver
    }

    /// Enqueue a blob import.
    pub fn enqueue_blob(
        &self,
        request: ImportRequest,
    ) -> oneshot::Receiver<FetchResult<(Arc<Blob>, FetchedSource)>> {
        self.enqueue::<BlobKind>(request)
    }

    /// Enqueue a tree import.
    pub fn enqueue_tree(
        &self,
        request: ImportRequest,
    ) -> oneshot::Receiver<FetchResult<(Arc<Tree>, FetchedSource)>> {
        self.enqueue::<TreeKind>(request)
    }

    /// Enqueue a blob aux-data import.
    pub fn enqueue_blob_aux(
        &self,
        request: ImportRequest,
    ) -> oneshot::Receiver<FetchResult<(Option<BlobAuxData>, FetchedSource)>> {
        self.enqueue::<BlobAuxKind>(request)
    }

    /// Enqueue a tree aux-data import.
    pub fn enqueue_tree_aux(
        &self,
        request: ImportRequest,
    ) -> oneshot::Receiver<FetchResult<(Option<TreeAuxData>, FetchedSource)>> {
        self.enqueue::<TreeAuxKind>(request)
    }

    /// Dequeue the next batch of requests.
    ///
    /// The batch is homogeneous in kind and sorted by priority (FIFO within
    /// a priority). Blocks while the queue is empty; returns an empty batch
    /// once the queue is stopped.
    pub async fn dequeue(&self) -> Vec<Arc<ImportRequest>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("import queue lock poisoned");
                if !state.running {
                    return Vec::new();
                }
                if let Some(batch) = Self::take_batch(&mut state, self.batch_sizes) {
                    return batch;
                }
            }

            notified.await;
        }
    }

    fn take_batch(
        state: &mut QueueState,
        batch_sizes: BatchSizes,
    ) -> Option<Vec<Arc<ImportRequest>>> {
        // Serve the kind whose best pending request has the highest
        // priority.
        let mut best: Option<(RequestKind, ImportPriority)> = None;
        for kind in RequestKind::ALL {
            let top = state.queues[kind.index()]
                .iter()
                .map(|entry| entry.request.priority())
                .max();
            if let Some(priority) = top
                && best.is_none_or(|(_, best_priority)| priority > best_priority)
            {
                best = Some((kind, priority));
            }
        }
        let (kind, _) = best?;

        let queue = &mut state.queues[kind.index()];
        queue.sort_by(|a, b| {
            b.request
                .priority()
                .cmp(&a.request.priority())
                .then(a.seq.cmp(&b.seq))
        });
        let take = batch_sizes.for_kind(kind).min(queue.len());
        Some(queue.drain(..take).map(|entry| entry.request).collect())
    }

    /// Resolve every sink attached to the outstanding import for `id` with
    /// a shared copy of `result`, and forget the import. A later enqueue
    /// for the same id starts a fresh fetch.
    pub fn mark_finished<K: ImportKind>(&self, id: &ObjectId, result: &FetchResult<K::Response>) {
        let request = {
            let mut state = self.state.lock().expect("import queue lock poisoned");
            state.tracker.remove(&(K::KIND, id.clone()))
        };
        if let Some(request) = request {
            request.resolve::<K>(result);
        }
    }

    /// Drain every queued (not yet dequeued) request, removing it from the
    /// tracker. Used by the drop-all-pending signal; the caller fails the
    /// returned requests.
    pub fn combine_and_clear(&self) -> Vec<Arc<ImportRequest>> {
        let mut state = self.state.lock().expect("import queue lock poisoned");
        let QueueState {
            queues, tracker, ..
        } = &mut *state;

        let mut drained = Vec::new();
        for queue in queues.iter_mut() {
            for entry in queue.drain(..) {
                tracker.remove(&(entry.request.kind(), entry.request.id().clone()));
                drained.push(entry.request);
            }
        }
        drained
    }

    /// Stop the queue: fail every queued request with `DroppedOnShutdown`,
    /// wake the workers so they drain, and reject later enqueues. Imports
    /// already handed to a worker still resolve normally.
    pub fn stop(&self) {
        let drained = {
            let mut state = self.state.lock().expect("import queue lock poisoned");
            state.running = false;
            let QueueState {
                queues, tracker, ..
            } = &mut *state;

            let mut drained = Vec::new();
            for queue in queues.iter_mut() {
                for entry in queue.drain(..) {
                    tracker.remove(&(entry.request.kind(), entry.request.id().clone()));
                    drained.push(entry.request);
                }
            }
            drained
        };

        for request in drained {
            request.fail(FetchError::DroppedOnShutdown);
        }
        self.notify.notify_waiters();
    }

    /// Number of queued (not yet dequeued) requests, across kinds.
    pub fn queued_len(&self) -> usize {
        let state = self.state.lock().expect("import queue lock poisoned");
        state.queues.iter().map(Vec::len).sum()
    }
}
