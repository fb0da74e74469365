//! Import requests and their completion sinks.

use crate::error::{FetchError, FetchResult};
use burrow_core::{
    Blob, BlobAuxData, FetchCause, FetchContext, FetchType, FetchedSource, ImportPriority,
    ObjectId, ProxyHash, Tree, TreeAuxData,
};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id tying a request's trace events together.
pub fn next_unique_id() -> u64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The four import request kinds. Dequeue batches are homogeneous in kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Blob,
    Tree,
    BlobAux,
    TreeAux,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Blob,
        RequestKind::Tree,
        RequestKind::BlobAux,
        RequestKind::TreeAux,
    ];

    pub fn index(self) -> usize {
        match self {
            RequestKind::Blob => 0,
            RequestKind::Tree => 1,
            RequestKind::BlobAux => 2,
            RequestKind::TreeAux => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestKind::Blob => "blob",
            RequestKind::Tree => "tree",
            RequestKind::BlobAux => "blob_aux",
            RequestKind::TreeAux => "tree_aux",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Completion sink for one caller awaiting an import.
pub type ResponseSender<T> = oneshot::Sender<FetchResult<T>>;

/// Per-kind sink storage. Requests de-duplicated onto one import each add a
/// sink here; all of them resolve together with a shared copy of the result.
pub enum RequestSinks {
    Blob(Vec<ResponseSender<(Arc<Blob>, FetchedSource)>>),
    Tree(Vec<ResponseSender<(Arc<Tree>, FetchedSource)>>),
    BlobAux(Vec<ResponseSender<(Option<BlobAuxData>, FetchedSource)>>),
    TreeAux(Vec<ResponseSender<(Option<TreeAuxData>, FetchedSource)>>),
}

/// Type-level description of one import kind: its response payload and how
/// to reach its sinks. The queue and fetcher are generic over this.
pub trait ImportKind {
    type Response: Clone + Send + 'static;
    const KIND: RequestKind;

    fn empty_sinks() -> RequestSinks;
    fn sinks(sinks: &mut RequestSinks) -> &mut Vec<ResponseSender<Self::Response>>;
    fn source_of(response: &Self::Response) -> FetchedSource;
}

pub struct BlobKind;
pub struct TreeKind;
pub struct BlobAuxKind;
pub struct TreeAuxKind;

impl ImportKind for BlobKind {
    type Response = (Arc<Blob>, FetchedSource);
    const KIND: RequestKind = RequestKind::Blob;

    fn empty_sinks() -> RequestSinks {
        RequestSinks::Blob(Vec::new())
    }

    fn sinks(sinks: &mut RequestSinks) -> &mut Vec<ResponseSender<Self::Response>> {
        match sinks {
            RequestSinks::Blob(sinks) => sinks,
            _ => unreachable!("blob sink requested on a non-blob import"),
        }
    }

    fn source_of(response: &Self::Response) -> FetchedSource {
        response.1
    }
}

impl ImportKind for TreeKind {
    type Response = (Arc<Tree>, FetchedSource);
    const KIND: RequestKind = RequestKind::Tree;

    fn empty_sinks() -> RequestSinks {
        RequestSinks::Tree(Vec::new())
    }

    fn sinks(sinks: &mut RequestSinks) -> &mut Vec<ResponseSender<Self::Response>> {
        match sinks {
            RequestSinks::Tree(sinks) => sinks,
            _ => unreachable!("tree sink requested on a non-tree import"),
        }
    }

    fn source_of(response: &Self::Response) -> FetchedSource {
        response.1
    }
}

impl ImportKind for BlobAuxKind {
    type Response = (Option<BlobAuxData>, FetchedSource);
    const KIND: RequestKind = RequestKind::BlobAux;

    fn empty_sinks() -> RequestSinks {
        RequestSinks::BlobAux(Vec::new())
    }

    fn sinks(sinks: &mut RequestSinks) -> &mut Vec<ResponseSender<Self::Response>> {
        match sinks {
            RequestSinks::BlobAux(sinks) => sinks,
            _ => unreachable!("blob-aux sink requested on a non-blob-aux import"),
        }
    }

    fn source_of(response: &Self::Response) -> FetchedSource {
        response.1
    }
}

impl ImportKind for TreeAuxKind {
    type Response = (Option<TreeAuxData>, FetchedSource);
    const KIND: RequestKind = RequestKind::TreeAux;

    fn empty_sinks() -> RequestSinks {
        RequestSinks::TreeAux(Vec::new())
    }

    fn sinks(sinks: &mut RequestSinks) -> &mut Vec<ResponseSender<Self::Response>> {
        match sinks {
            RequestSinks::TreeAux(sinks) => sinks,
            _ => unreachable!("tree-aux sink requested on a non-tree-aux import"),
        }
    }

    fn source_of(response: &Self::Response) -> FetchedSource {
        response.1
    }
}

/// One pending import: everything needed to fulfill the fetch plus the
/// sinks of every caller waiting on it.
pub struct ImportRequest {
    kind: RequestKind,
    id: ObjectId,
    proxy: ProxyHash,
    fetch_type: FetchType,
    cause: FetchCause,
    pid: Option<u32>,
    unique: u64,
    priority: Mutex<ImportPriority>,
    sinks: Mutex<RequestSinks>,
}

impl ImportRequest {
    /// Create a request for kind `K` with no sinks attached yet.
    pub fn new<K: ImportKind>(
        id: ObjectId,
        proxy: ProxyHash,
        ctx: &FetchContext,
        fetch_type: FetchType,
    ) -> Self {
        Self {
            kind: K::KIND,
            id,
            proxy,
            fetch_type,
            cause: ctx.cause,
            pid: ctx.client_pid,
            unique: next_unique_id(),
            priority: Mutex::new(ctx.priority),
            sinks: Mutex::new(K::empty_sinks()),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn proxy(&self) -> &ProxyHash {
        &self.proxy
    }

    pub fn fetch_type(&self) -> FetchType {
        self.fetch_type
    }

    pub fn cause(&self) -> FetchCause {
        self.cause
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn unique(&self) -> u64 {
        self.unique
    }

    pub fn priority(&self) -> ImportPriority {
        *self.priority.lock().expect("request priority lock poisoned")
    }

    /// Raise the priority to at least `priority`. De-duplicated enqueues
    /// promote the queued import rather than waiting behind it.
    pub fn bump_priority(&self, priority: ImportPriority) {
        let mut current = self.priority.lock().expect("request priority lock poisoned");
        if priority > *current {
            *current = priority;
        }
    }

    /// Attach one caller's sink.
    pub fn push_sink<K: ImportKind>(&self, sender: ResponseSender<K::Response>) {
        K::sinks(&mut self.sinks.lock().expect("request sinks lock poisoned")).push(sender);
    }

    /// Resolve every attached sink with a shared copy of `result`.
    pub fn resolve<K: ImportKind>(&self, result: &FetchResult<K::Response>) {
        let mut sinks = self.sinks.lock().expect("request sinks lock poisoned");
        for sender in K::sinks(&mut sinks).drain(..) {
            let _ = sender.send(result.clone());
        }
    }

    /// Fail every attached sink, whatever the kind.
    pub fn fail(&self, error: FetchError) {
        let mut sinks = self.sinks.lock().expect("request sinks lock poisoned");
        match &mut *sinks {
            RequestSinks::Blob(sinks) => {
                for sender in sinks.drain(..) {
                    let _ = sender.send(Err(error.clone()));
                }
            }
            RequestSinks::Tree(sinks) => {
                for sender in sinks.drain(..) {
                    let _ = sender.send(Err(error.clone()));
                }
            }
            RequestSinks::BlobAux(sinks) => {
                for sender in sinks.drain(..) {
                    let _ = sender.send(Err(error.clone()));
                }
            }
            RequestSinks::TreeAux(sinks) => {
                for sender in sinks.drain(..) {
                    let _ = sender.send(Err(error.clone()));
                }
            }
        }
    }
}

impl fmt::Debug for ImportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRequest")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("unique", &self.unique)
            .finish()
    }
}
