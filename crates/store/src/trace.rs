//! Trace bus and activity buffer.
//!
//! A bounded, lossy event bus carrying queue/start/finish events for every
//! import, plus a built-in subscriber that folds them into a bounded ring
//! buffer and an outstanding-import table. Strictly observability: dropped
//! events never affect correctness.

use crate::request::RequestKind;
use burrow_core::{FetchCause, FetchContext, FetchedSource, Hash20, PriorityClass, ProxyHash,
    RepoPathBuf};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Lifecycle phase of an import, as seen on the trace bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracePhase {
    Queue,
    Start,
    Finish,
}

/// One import lifecycle event.
#[derive(Clone, Debug)]
pub struct TraceEvent {
    pub unique: u64,
    pub phase: TracePhase,
    pub kind: RequestKind,
    pub rev: Hash20,
    pub path: RepoPathBuf,
    pub priority: PriorityClass,
    pub cause: FetchCause,
    pub pid: Option<u32>,
    pub fetched_source: Option<FetchedSource>,
}

impl TraceEvent {
    pub fn queued(unique: u64, kind: RequestKind, proxy: &ProxyHash, ctx: &FetchContext) -> Self {
        Self {
            unique,
            phase: TracePhase::Queue,
            kind,
            rev: *proxy.rev(),
            path: proxy.path().clone(),
            priority: ctx.priority.class,
            cause: ctx.cause,
            pid: ctx.client_pid,
            fetched_source: None,
        }
    }

    pub fn started(
        unique: u64,
        kind: RequestKind,
        proxy: &ProxyHash,
        priority: PriorityClass,
        cause: FetchCause,
        pid: Option<u32>,
    ) -> Self {
        Self {
            unique,
            phase: TracePhase::Start,
            kind,
            rev: *proxy.rev(),
            path: proxy.path().clone(),
            priority,
            cause,
            pid,
            fetched_source: None,
        }
    }

    pub fn finished(
        unique: u64,
        kind: RequestKind,
        proxy: &ProxyHash,
        ctx: &FetchContext,
        fetched_source: Option<FetchedSource>,
    ) -> Self {
        Self {
            unique,
            phase: TracePhase::Finish,
            kind,
            rev: *proxy.rev(),
            path: proxy.path().clone(),
            priority: ctx.priority.class,
            cause: ctx.cause,
            pid: ctx.client_pid,
            fetched_source,
        }
    }
}

/// Bounded single-producer-multi-consumer event bus. Publication never
/// blocks; slow subscribers lose the oldest events.
pub struct TraceBus {
    sender: broadcast::Sender<TraceEvent>,
}

impl TraceBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. A bus with no subscribers drops it.
    pub fn publish(&self, event: TraceEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe a callback on its own task. The subscription ends when the
    /// returned handle drops.
    pub fn subscribe_fn<F>(&self, name: &str, mut callback: F) -> TraceSubscription
    where
        F: FnMut(TraceEvent) + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(subscriber = %name, missed, "trace subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        TraceSubscription { handle }
    }
}

/// Handle to a trace subscription; unsubscribes on drop.
pub struct TraceSubscription {
    handle: JoinHandle<()>,
}

impl Drop for TraceSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct ActivityState {
    events: VecDeque<TraceEvent>,
    outstanding: HashMap<u64, TraceEvent>,
}

/// Bounded in-memory view of recent and outstanding imports.
///
/// Queue and start events upsert the outstanding table keyed by the
/// import's unique id; finish removes. Every event also lands in a ring
/// buffer that drops its oldest entry at capacity.
#[derive(Clone)]
pub struct ActivityBuffer {
    capacity: usize,
    state: Arc<Mutex<ActivityState>>,
}

impl ActivityBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Arc::new(Mutex::new(ActivityState {
                events: VecDeque::new(),
                outstanding: HashMap::new(),
            })),
        }
    }

    /// Fold one event into the buffer.
    pub fn observe(&self, event: TraceEvent) {
        let mut state = self.state.lock().expect("activity buffer lock poisoned");
        match event.phase {
            TracePhase::Queue | TracePhase::Start => {
                state.outstanding.insert(event.unique, event.clone());
            }
            TracePhase::Finish => {
                state.outstanding.remove(&event.unique);
            }
        }
        state.events.push_back(event);
        if state.events.len() > self.capacity {
            state.events.pop_front();
        }
    }

    /// Snapshot of the ring buffer, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        let state = self.state.lock().expect("activity buffer lock poisoned");
        state.events.iter().cloned().collect()
    }

    /// Snapshot of imports that queued or started but have not finished.
    pub fn outstanding(&self) -> Vec<TraceEvent> {
        let state = self.state.lock().expect("activity buffer lock poisoned");
        state.outstanding.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::ImportPriority;

    fn proxy() -> ProxyHash {
        ProxyHash::new(
            Hash20::from_hex(&"ab".repeat(20)).unwrap(),
            RepoPathBuf::new("src/lib.rs").unwrap(),
        )
    }

    fn ctx() -> FetchContext {
        FetchContext::new(ImportPriority::normal(), FetchCause::Fs)
    }

    #[test]
    fn test_outstanding_merges_queue_start_finish() {
        let buffer = ActivityBuffer::new(10);
        buffer.observe(TraceEvent::queued(7, RequestKind::Blob, &proxy(), &ctx()));
        assert_eq!(buffer.outstanding().len(), 1);
        assert_eq!(buffer.outstanding()[0].phase, TracePhase::Queue);

        buffer.observe(TraceEvent::started(
            7,
            RequestKind::Blob,
            &proxy(),
            PriorityClass::Normal,
            FetchCause::Fs,
            None,
        ));
        assert_eq!(buffer.outstanding().len(), 1);
        assert_eq!(buffer.outstanding()[0].phase, TracePhase::Start);

        buffer.observe(TraceEvent::finished(
            7,
            RequestKind::Blob,
            &proxy(),
            &ctx(),
            Some(FetchedSource::Local),
        ));
        assert!(buffer.outstanding().is_empty());
        assert_eq!(buffer.events().len(), 3);
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let buffer = ActivityBuffer::new(2);
        for unique in 0..5 {
            buffer.observe(TraceEvent::queued(unique, RequestKind::Tree, &proxy(), &ctx()));
        }
        let events = buffer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].unique, 3);
        assert_eq!(events[1].unique, 4);
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscriber() {
        let bus = TraceBus::new(16);
        let buffer = ActivityBuffer::new(16);
        let _sub = bus.subscribe_fn("test", {
            let buffer = buffer.clone();
            move |event| buffer.observe(event)
        });

        bus.publish(TraceEvent::queued(1, RequestKind::Blob, &proxy(), &ctx()));
        // Give the subscriber task a chance to run.
        for _ in 0..50 {
            if !buffer.events().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(buffer.events().len(), 1);
    }
}
