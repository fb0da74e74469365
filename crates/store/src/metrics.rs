//! Prometheus metrics for the fetch core.
//!
//! Global counters and histograms cover fetch outcomes per object kind;
//! the per-instance [`ImportMetrics`] tracks pending and live imports the
//! way the admin surface reports them.

use crate::request::RequestKind;
use burrow_core::{FetchType, FetchedSource};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Once};
use std::time::Duration;

/// Global Prometheus registry for all fetch metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Fetch outcomes by kind, fetch type, and result.
pub static IMPORT_RESULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burrow_import_results_total",
            "Import outcomes by object kind, fetch type, and result",
        ),
        &["kind", "fetch_type", "result"],
    )
    .expect("metric creation failed")
});

/// Where successful fetches were answered from.
pub static IMPORT_SOURCES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burrow_import_sources_total",
            "Successful imports by object kind and fetched source",
        ),
        &["kind", "source"],
    )
    .expect("metric creation failed")
});

/// Time from batch start to sink resolution, per kind.
pub static IMPORT_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "burrow_import_duration_seconds",
            "Time taken to resolve an import",
        )
        .buckets(vec![0.001, 0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0]),
        &["kind"],
    )
    .expect("metric creation failed")
});

/// Duration of public fetch API calls, per kind.
pub static FETCH_API_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "burrow_fetch_api_duration_seconds",
            "Duration of public fetch API calls",
        )
        .buckets(vec![0.001, 0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0]),
        &["op"],
    )
    .expect("metric creation failed")
});

/// Root tree import duration.
pub static ROOT_TREE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "burrow_root_tree_duration_seconds",
            "Time taken to import a commit's root tree",
        )
        .buckets(vec![0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

/// Glob evaluation outcomes.
pub static GLOB_FILES_RESULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burrow_glob_files_total",
            "Glob file evaluations by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register every metric with [`REGISTRY`]. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(IMPORT_RESULTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORT_SOURCES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMPORT_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FETCH_API_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ROOT_TREE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GLOB_FILES_RESULTS.clone()))
            .expect("metric registration failed");
    });
}

/// Render the registry in Prometheus text exposition format.
pub fn gather() -> String {
    TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}

fn fetch_type_label(fetch_type: FetchType) -> &'static str {
    match fetch_type {
        FetchType::Fetch => "fetch",
        FetchType::Prefetch => "prefetch",
    }
}

fn source_label(source: FetchedSource) -> &'static str {
    match source {
        FetchedSource::Local => "local",
        FetchedSource::Remote => "remote",
        FetchedSource::Unknown => "unknown",
    }
}

/// Record a resolved import.
pub fn record_import_success(
    kind: RequestKind,
    fetch_type: FetchType,
    source: FetchedSource,
    in_retry: bool,
    elapsed: Duration,
) {
    let result = if in_retry { "success_retry" } else { "success" };
    IMPORT_RESULTS
        .with_label_values(&[kind.name(), fetch_type_label(fetch_type), result])
        .inc();
    IMPORT_SOURCES
        .with_label_values(&[kind.name(), source_label(source)])
        .inc();
    IMPORT_DURATION
        .with_label_values(&[kind.name()])
        .observe(elapsed.as_secs_f64());
}

/// Record an import that failed terminally.
pub fn record_import_failure(kind: RequestKind, fetch_type: FetchType) {
    IMPORT_RESULTS
        .with_label_values(&[kind.name(), fetch_type_label(fetch_type), "failure"])
        .inc();
}

/// Stage of an import as reported by the admin surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStage {
    /// Enqueued, not yet picked up by a worker.
    Pending,
    /// Being processed by a worker.
    Live,
}

impl RequestStage {
    fn index(self) -> usize {
        match self {
            RequestStage::Pending => 0,
            RequestStage::Live => 1,
        }
    }
}

/// Per-instance pending/live import gauges, one slot per request kind.
#[derive(Default)]
pub struct ImportMetrics {
    counts: [[AtomicUsize; 4]; 2],
}

impl ImportMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current count for a stage and kind.
    pub fn count(&self, stage: RequestStage, kind: RequestKind) -> usize {
        self.counts[stage.index()][kind.index()].load(Ordering::Relaxed)
    }

    /// Enter a stage; the returned guard leaves it on drop.
    pub fn scope(&self, stage: RequestStage, kind: RequestKind) -> ImportScope<'_> {
        self.counts[stage.index()][kind.index()].fetch_add(1, Ordering::Relaxed);
        ImportScope {
            metrics: self,
            stage,
            kind,
        }
    }
}

/// RAII guard for one import's stage membership.
pub struct ImportScope<'a> {
    metrics: &'a ImportMetrics,
    stage: RequestStage,
    kind: RequestKind,
}

impl Drop for ImportScope<'_> {
    fn drop(&mut self) {
        self.metrics.counts[self.stage.index()][self.kind.index()]
            .fetch_sub(1, Ordering::Relaxed);
    }
}
