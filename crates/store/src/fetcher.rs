//! Fetcher worker pool.
//!
//! Each worker loops dequeueing homogeneous batches and driving the
//! multi-stage fetch: a LocalOnly batch, a RemoteOnly batch for the
//! survivors, then a bounded per-item retry that flushes the adapter first.
//! When `allow_remote_get_batch` is set the two staged batches collapse into
//! a single AllowRemote batch and the fetched-source tag degrades to
//! Unknown.

use crate::adapter::{FetchMode, NativeRequest};
use crate::backing::StoreInner;
use crate::metrics::{self, RequestStage};
use crate::request::{
    BlobAuxKind, BlobKind, ImportRequest, RequestKind, TreeAuxKind, TreeKind,
};
use crate::telemetry::{FetchMiss, LogEvent};
use crate::trace::TraceEvent;
use burrow_core::{Blob, BlobAuxData, FetchedSource, Hash20, Tree, TreeAuxData};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Worker loop: dequeue, dispatch by kind, repeat until the queue stops.
pub(crate) async fn run_worker(inner: Arc<StoreInner>) {
    loop {
        let batch = inner.queue.dequeue().await;
        if batch.is_empty() {
            break;
        }
        match batch[0].kind() {
            RequestKind::Blob => process_blob_import_requests(&inner, batch).await,
            RequestKind::Tree => process_tree_import_requests(&inner, batch).await,
            RequestKind::BlobAux => process_blob_aux_import_requests(&inner, batch).await,
            RequestKind::TreeAux => process_tree_aux_import_requests(&inner, batch).await,
        }
    }
}

fn publish_start_events(inner: &StoreInner, requests: &[Arc<ImportRequest>]) {
    for request in requests {
        inner.trace.publish(TraceEvent::started(
            request.unique(),
            request.kind(),
            request.proxy(),
            request.priority().class,
            request.cause(),
            request.pid(),
        ));
        tracing::debug!(kind = %request.kind(), id = %request.id(), "processing import request");
    }
}

/// Group a batch by proxy revision hash and de-duplicate the adapter
/// requests by (revision, cause), preserving batch order.
///
/// Two requests may share a revision with distinct object ids when two
/// paths carry the same content; that is expected but worth a debug line.
fn prepare_requests(requests: &[Arc<ImportRequest>], kind: RequestKind) -> Vec<NativeRequest> {
    let mut order: Vec<Hash20> = Vec::new();
    let mut groups: HashMap<Hash20, Vec<&Arc<ImportRequest>>> = HashMap::new();

    for request in requests {
        let rev = *request.proxy().rev();
        let group = groups.entry(rev).or_insert_with(|| {
            order.push(rev);
            Vec::new()
        });
        if let Some(prior) = group.first() {
            tracing::debug!(kind = %kind, rev = %rev, "duplicate fetch request for proxy hash");
            if prior.id() != request.id() {
                tracing::debug!(
                    kind = %kind,
                    rev = %rev,
                    prior_id = %prior.id(),
                    current_id = %request.id(),
                    "requests share a proxy hash but carry distinct object ids"
                );
            }
        }
        group.push(request);
    }

    let mut native = Vec::new();
    for rev in order {
        let mut seen_causes = HashSet::new();
        for request in &groups[&rev] {
            if seen_causes.insert(request.cause()) {
                native.push(NativeRequest {
                    rev,
                    cause: request.cause(),
                });
            }
        }
    }
    native
}

// ===== Blobs =====

async fn process_blob_import_requests(
    inner: &Arc<StoreInner>,
    requests: Vec<Arc<ImportRequest>>,
) {
    let watch = Instant::now();
    tracing::debug!(batch_size = requests.len(), "processing blob import batch");
    let _live: Vec<_> = requests
        .iter()
        .map(|_| {
            inner
                .import_metrics
                .scope(RequestStage::Live, RequestKind::Blob)
        })
        .collect();
    publish_start_events(inner, &requests);

    let unresolved = if inner.config.allow_remote_get_batch {
        fetch_blob_batch(inner, requests, FetchMode::AllowRemote, watch).await
    } else {
        let unresolved = fetch_blob_batch(inner, requests, FetchMode::LocalOnly, watch).await;
        fetch_blob_batch(inner, unresolved, FetchMode::RemoteOnly, watch).await
    };
    if unresolved.is_empty() {
        return;
    }

    if inner.config.inline_retries {
        for request in unresolved {
            retry_get_blob(inner, request, watch).await;
        }
    } else {
        let mut handles = Vec::with_capacity(unresolved.len());
        for request in unresolved {
            let permit = inner
                .retry_permits
                .clone()
                .acquire_owned()
                .await
                .expect("retry pool semaphore closed");
            let inner = Arc::clone(inner);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                retry_get_blob(&inner, request, watch).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn fetch_blob_batch(
    inner: &StoreInner,
    requests: Vec<Arc<ImportRequest>>,
    mode: FetchMode,
    watch: Instant,
) -> Vec<Arc<ImportRequest>> {
    if requests.is_empty() {
        return requests;
    }
    let native = prepare_requests(&requests, RequestKind::Blob);
    let results = inner.store.get_blob_batch(&native, mode).await;
    debug_assert_eq!(native.len(), results.len());

    let mut found: HashMap<Hash20, Arc<Blob>> = HashMap::new();
    for (request, result) in native.iter().zip(results) {
        match result {
            Ok(blob) => {
                found.insert(request.rev, Arc::new(blob));
            }
            Err(error) => {
                tracing::debug!(node = %request.rev, mode = ?mode, error = %error, "blob batch miss");
            }
        }
    }

    let source = mode.fetched_source();
    let mut unresolved = Vec::new();
    for request in requests {
        match found.get(request.proxy().rev()) {
            Some(blob) => {
                metrics::record_import_success(
                    RequestKind::Blob,
                    request.fetch_type(),
                    source,
                    false,
                    watch.elapsed(),
                );
                inner
                    .queue
                    .mark_finished::<BlobKind>(request.id(), &Ok((Arc::clone(blob), source)));
            }
            None => unresolved.push(request),
        }
    }
    unresolved
}

async fn retry_get_blob(inner: &StoreInner, request: Arc<ImportRequest>, watch: Instant) {
    // Flush so data a client just wrote into the local store is picked up.
    inner.store.flush().await;

    let mut mode = if inner.config.allow_remote_get_batch {
        FetchMode::AllowRemote
    } else {
        FetchMode::LocalOnly
    };
    let mut result = inner.store.get_blob(request.proxy().rev(), mode).await;
    if result.is_err() && mode == FetchMode::LocalOnly {
        mode = FetchMode::RemoteOnly;
        result = inner.store.get_blob(request.proxy().rev(), mode).await;
    }

    let source = mode.fetched_source();
    match result {
        Ok(blob) => {
            metrics::record_import_success(
                RequestKind::Blob,
                request.fetch_type(),
                source,
                true,
                watch.elapsed(),
            );
            inner
                .queue
                .mark_finished::<BlobKind>(request.id(), &Ok((Arc::new(blob), source)));
        }
        Err(error) => {
            inner.logger.log_event(LogEvent::FetchMiss(FetchMiss {
                repo: inner.store.repo_name().to_string(),
                kind: RequestKind::Blob,
                reason: error.to_string(),
                is_retry: true,
                dogfooding_host: inner.store.dogfooding_host(),
            }));
            metrics::record_import_failure(RequestKind::Blob, request.fetch_type());
            inner.queue.mark_finished::<BlobKind>(request.id(), &Err(error));
        }
    }
}

// ===== Trees =====

async fn process_tree_import_requests(
    inner: &Arc<StoreInner>,
    requests: Vec<Arc<ImportRequest>>,
) {
    let watch = Instant::now();
    tracing::debug!(batch_size = requests.len(), "processing tree import batch");
    let _live: Vec<_> = requests
        .iter()
        .map(|_| {
            inner
                .import_metrics
                .scope(RequestStage::Live, RequestKind::Tree)
        })
        .collect();
    publish_start_events(inner, &requests);

    let unresolved = if inner.config.allow_remote_get_batch {
        fetch_tree_batch(inner, requests, FetchMode::AllowRemote, watch).await
    } else {
        let unresolved = fetch_tree_batch(inner, requests, FetchMode::LocalOnly, watch).await;
        fetch_tree_batch(inner, unresolved, FetchMode::RemoteOnly, watch).await
    };
    if unresolved.is_empty() {
        return;
    }

    if inner.config.inline_retries {
        for request in unresolved {
            retry_get_tree(inner, request, watch).await;
        }
    } else {
        let mut handles = Vec::with_capacity(unresolved.len());
        for request in unresolved {
            let permit = inner
                .retry_permits
                .clone()
                .acquire_owned()
                .await
                .expect("retry pool semaphore closed");
            let inner = Arc::clone(inner);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                retry_get_tree(&inner, request, watch).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn fetch_tree_batch(
    inner: &StoreInner,
    requests: Vec<Arc<ImportRequest>>,
    mode: FetchMode,
    watch: Instant,
) -> Vec<Arc<ImportRequest>> {
    if requests.is_empty() {
        return requests;
    }
    let native = prepare_requests(&requests, RequestKind::Tree);
    let results = inner.store.get_tree_batch(&native, mode).await;
    debug_assert_eq!(native.len(), results.len());

    let mut found: HashMap<Hash20, Arc<Tree>> = HashMap::new();
    for (request, result) in native.iter().zip(results) {
        match result {
            Ok(tree) => {
                found.insert(request.rev, Arc::new(tree));
            }
            Err(error) => {
                tracing::debug!(node = %request.rev, mode = ?mode, error = %error, "tree batch miss");
            }
        }
    }

    let source = mode.fetched_source();
    let mut unresolved = Vec::new();
    for request in requests {
        match found.get(request.proxy().rev()) {
            Some(tree) => {
                metrics::record_import_success(
                    RequestKind::Tree,
                    request.fetch_type(),
                    source,
                    false,
                    watch.elapsed(),
                );
                inner
                    .queue
                    .mark_finished::<TreeKind>(request.id(), &Ok((Arc::clone(tree), source)));
            }
            None => unresolved.push(request),
        }
    }
    unresolved
}

async fn retry_get_tree(inner: &StoreInner, request: Arc<ImportRequest>, watch: Instant) {
    inner.store.flush().await;

    let mut mode = if inner.config.allow_remote_get_batch {
        FetchMode::AllowRemote
    } else {
        FetchMode::LocalOnly
    };
    let mut result = inner.store.get_tree(request.proxy().rev(), mode).await;
    if result.is_err() && mode == FetchMode::LocalOnly {
        mode = FetchMode::RemoteOnly;
        result = inner.store.get_tree(request.proxy().rev(), mode).await;
    }

    let source = mode.fetched_source();
    match result {
        Ok(tree) => {
            metrics::record_import_success(
                RequestKind::Tree,
                request.fetch_type(),
                source,
                true,
                watch.elapsed(),
            );
            inner
                .queue
                .mark_finished::<TreeKind>(request.id(), &Ok((Arc::new(tree), source)));
        }
        Err(error) => {
            inner.logger.log_event(LogEvent::FetchMiss(FetchMiss {
                repo: inner.store.repo_name().to_string(),
                kind: RequestKind::Tree,
                reason: error.to_string(),
                is_retry: true,
                dogfooding_host: inner.store.dogfooding_host(),
            }));
            metrics::record_import_failure(RequestKind::Tree, request.fetch_type());
            inner.queue.mark_finished::<TreeKind>(request.id(), &Err(error));
        }
    }
}

// ===== Aux data =====
//
// Aux kinds run the same staged batches but no per-item retry: an
// unresolved aux datum resolves as a null value so the caller can fall back
// to computing the digest from a blob fetch. Fetching the blob from here
// could deadlock with every worker parked in this path.

async fn process_blob_aux_import_requests(
    inner: &Arc<StoreInner>,
    requests: Vec<Arc<ImportRequest>>,
) {
    let watch = Instant::now();
    let _live: Vec<_> = requests
        .iter()
        .map(|_| {
            inner
                .import_metrics
                .scope(RequestStage::Live, RequestKind::BlobAux)
        })
        .collect();
    publish_start_events(inner, &requests);

    let unresolved = if inner.config.allow_remote_get_batch {
        fetch_blob_aux_batch(inner, requests, FetchMode::AllowRemote, watch).await
    } else {
        let unresolved = fetch_blob_aux_batch(inner, requests, FetchMode::LocalOnly, watch).await;
        fetch_blob_aux_batch(inner, unresolved, FetchMode::RemoteOnly, watch).await
    };

    for request in unresolved {
        metrics::record_import_failure(RequestKind::BlobAux, request.fetch_type());
        inner
            .queue
            .mark_finished::<BlobAuxKind>(request.id(), &Ok((None, FetchedSource::Unknown)));
    }
}

async fn fetch_blob_aux_batch(
    inner: &StoreInner,
    requests: Vec<Arc<ImportRequest>>,
    mode: FetchMode,
    watch: Instant,
) -> Vec<Arc<ImportRequest>> {
    if requests.is_empty() {
        return requests;
    }
    let native = prepare_requests(&requests, RequestKind::BlobAux);
    let results = inner.store.get_blob_aux_batch(&native, mode).await;
    debug_assert_eq!(native.len(), results.len());

    let mut found: HashMap<Hash20, BlobAuxData> = HashMap::new();
    for (request, result) in native.iter().zip(results) {
        match result {
            Ok(aux) => {
                found.insert(request.rev, aux);
            }
            Err(error) => {
                tracing::debug!(node = %request.rev, mode = ?mode, error = %error, "blob aux batch miss");
            }
        }
    }

    let source = mode.fetched_source();
    let mut unresolved = Vec::new();
    for request in requests {
        match found.get(request.proxy().rev()) {
            Some(aux) => {
                metrics::record_import_success(
                    RequestKind::BlobAux,
                    request.fetch_type(),
                    source,
                    false,
                    watch.elapsed(),
                );
                inner
                    .queue
                    .mark_finished::<BlobAuxKind>(request.id(), &Ok((Some(*aux), source)));
            }
            None => unresolved.push(request),
        }
    }
    unresolved
}

async fn process_tree_aux_import_requests(
    inner: &Arc<StoreInner>,
    requests: Vec<Arc<ImportRequest>>,
) {
    let watch = Instant::now();
    let _live: Vec<_> = requests
        .iter()
        .map(|_| {
            inner
                .import_metrics
                .scope(RequestStage::Live, RequestKind::TreeAux)
        })
        .collect();
    publish_start_events(inner, &requests);

    let unresolved = if inner.config.allow_remote_get_batch {
        fetch_tree_aux_batch(inner, requests, FetchMode::AllowRemote, watch).await
    } else {
        let unresolved = fetch_tree_aux_batch(inner, requests, FetchMode::LocalOnly, watch).await;
        fetch_tree_aux_batch(inner, unresolved, FetchMode::RemoteOnly, watch).await
    };

    for request in unresolved {
        metrics::record_import_failure(RequestKind::TreeAux, request.fetch_type());
        inner
            .queue
            .mark_finished::<TreeAuxKind>(request.id(), &Ok((None, FetchedSource::Unknown)));
    }
}

async fn fetch_tree_aux_batch(
    inner: &StoreInner,
    requests: Vec<Arc<ImportRequest>>,
    mode: FetchMode,
    watch: Instant,
) -> Vec<Arc<ImportRequest>> {
    if requests.is_empty() {
        return requests;
    }
    let native = prepare_requests(&requests, RequestKind::TreeAux);
    let results = inner.store.get_tree_aux_batch(&native, mode).await;
    debug_assert_eq!(native.len(), results.len());

    let mut found: HashMap<Hash20, TreeAuxData> = HashMap::new();
    for (request, result) in native.iter().zip(results) {
        match result {
            Ok(aux) => {
                found.insert(request.rev, aux);
            }
            Err(error) => {
                tracing::debug!(node = %request.rev, mode = ?mode, error = %error, "tree aux batch miss");
            }
        }
    }

    let source = mode.fetched_source();
    let mut unresolved = Vec::new();
    for request in requests {
        match found.get(request.proxy().rev()) {
            Some(aux) => {
                metrics::record_import_success(
                    RequestKind::TreeAux,
                    request.fetch_type(),
                    source,
                    false,
                    watch.elapsed(),
                );
                inner
                    .queue
                    .mark_finished::<TreeAuxKind>(request.id(), &Ok((Some(*aux), source)));
            }
            None => unresolved.push(request),
        }
    }
    unresolved
}
