//! Structured telemetry events.

use crate::request::RequestKind;

/// A fetch that failed after the full local/remote/retry cascade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchMiss {
    pub repo: String,
    pub kind: RequestKind,
    pub reason: String,
    pub is_retry: bool,
    pub dogfooding_host: bool,
}

/// Structured events published by the fetch core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    FetchMiss(FetchMiss),
    /// A proxy-hash lookup failed. Throttled at the source so bulk misses
    /// do not flood the log.
    MissingProxyHash,
}

/// Sink for structured telemetry events.
pub trait StructuredLogger: Send + Sync + 'static {
    fn log_event(&self, event: LogEvent);
}

/// Default logger: emits events through `tracing`.
pub struct TracingLogger;

impl StructuredLogger for TracingLogger {
    fn log_event(&self, event: LogEvent) {
        match event {
            LogEvent::FetchMiss(miss) => {
                tracing::warn!(
                    repo = %miss.repo,
                    kind = %miss.kind,
                    reason = %miss.reason,
                    is_retry = miss.is_retry,
                    dogfooding_host = miss.dogfooding_host,
                    "fetch miss"
                );
            }
            LogEvent::MissingProxyHash => {
                tracing::warn!("proxy hash lookup failed");
            }
        }
    }
}
