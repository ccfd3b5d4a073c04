//! Event loop behavior against a scripted bus and the in-memory store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracker_common::{DimensionKind, ResolverKind};
use tracker_consumer::{BusConnection, BusEvent, BusMessage, ConsumerMetrics, EventLoop};
use tracker_store::{build_resolver, MemoryStore};

// ---------------------------------------------------------------------------
// Scripted bus
// ---------------------------------------------------------------------------

/// Replays queued events, then idles for the full poll timeout like a quiet
/// topic would.
#[derive(Clone, Default)]
struct ScriptedBus {
    events: Arc<Mutex<VecDeque<BusEvent>>>,
    polls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedBus {
    fn push(&self, event: BusEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    fn pending(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl BusConnection for ScriptedBus {
    async fn poll(&mut self, timeout: Duration) -> Option<BusEvent> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.events.lock().unwrap().pop_front();
        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        next
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn message(offset: i64, body: serde_json::Value) -> BusEvent {
    BusEvent::Message(BusMessage {
        topic: "platform.payload-status".into(),
        partition: 0,
        offset,
        payload: serde_json::to_vec(&body).unwrap(),
    })
}

fn status(request_id: &str, status: &str) -> serde_json::Value {
    json!({
        "service": "ingress",
        "request_id": request_id,
        "account": "000001",
        "status": status,
        "date": "2024-03-01T12:00:00Z"
    })
}

struct Harness {
    bus: ScriptedBus,
    store: Arc<MemoryStore>,
    metrics: Arc<ConsumerMetrics>,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Self {
            bus: ScriptedBus::default(),
            store: Arc::new(MemoryStore::new()),
            metrics: Arc::new(ConsumerMetrics::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let resolver = build_resolver(ResolverKind::Cached, self.store.clone());
        let event_loop = EventLoop::new(self.bus.clone(), self.store.clone(), resolver)
            .with_metrics(self.metrics.clone());
        tokio::spawn(event_loop.run(self.cancel.clone()))
    }

    /// Let the loop drain the script.
    async fn settle(&self) {
        while self.bus.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn messages_are_counted_and_recorded() {
    let h = Harness::new();
    h.bus.push(message(1, status("req-1", "received")));
    h.bus.push(message(2, status("req-1", "processing")));
    h.bus.push(message(3, status("req-2", "received")));

    let task = h.spawn();
    h.settle().await;
    h.cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.metrics.consumed(), 3);
    assert_eq!(h.metrics.errors(), 0);
    assert_eq!(h.store.payloads().len(), 2);
    assert_eq!(h.store.statuses().len(), 3);
    assert_eq!(h.store.dimensions(DimensionKind::Status).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_error_is_counted_and_loop_continues() {
    let h = Harness::new();
    h.bus.push(BusEvent::Error("broker transport failure".into()));
    h.bus.push(message(1, status("req-1", "received")));

    let task = h.spawn();
    h.settle().await;
    assert!(!task.is_finished());

    h.cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.metrics.errors(), 1);
    assert_eq!(h.metrics.consumed(), 1);
    assert_eq!(h.store.statuses().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn commit_failures_and_unknown_events_are_not_counted() {
    let h = Harness::new();
    h.bus.push(BusEvent::OffsetsCommitted {
        error: Some("coordinator not available".into()),
    });
    h.bus.push(BusEvent::OffsetsCommitted { error: None });
    h.bus.push(BusEvent::Other("partition EOF".into()));

    let task = h.spawn();
    h.settle().await;
    h.cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.metrics.consumed(), 0);
    assert_eq!(h.metrics.errors(), 0);
}

#[tokio::test(start_paused = true)]
async fn bad_messages_are_dropped_without_stopping() {
    let h = Harness::new();
    h.bus.push(BusEvent::Message(BusMessage {
        topic: "platform.payload-status".into(),
        partition: 0,
        offset: 1,
        payload: b"{not json".to_vec(),
    }));
    h.bus.push(message(2, json!({"service": "ingress", "status": "received"})));
    h.bus.push(message(3, status("req-1", "success")));

    let task = h.spawn();
    h.settle().await;
    h.cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.metrics.consumed(), 3);
    assert_eq!(h.store.payloads().len(), 1);
    assert_eq!(h.store.statuses().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_outage_drops_message_and_keeps_consuming() {
    let h = Harness::new();
    h.store.set_failing(true);
    h.bus.push(message(1, status("req-1", "received")));

    let task = h.spawn();
    h.settle().await;
    assert!(h.store.payloads().is_empty());

    h.store.set_failing(false);
    h.bus.push(message(2, status("req-1", "processing")));
    h.settle().await;
    h.cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.metrics.consumed(), 2);
    assert_eq!(h.store.statuses().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_within_one_poll_and_closes_once() {
    let h = Harness::new();
    let task = h.spawn();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let polls_before = h.bus.polls.load(Ordering::SeqCst);
    h.cancel.cancel();
    task.await.unwrap();

    let polls_after = h.bus.polls.load(Ordering::SeqCst);
    assert!(polls_after - polls_before <= 1);
    assert_eq!(h.bus.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_never_polls() {
    let h = Harness::new();
    h.cancel.cancel();

    h.spawn().await.unwrap();

    assert_eq!(h.bus.polls.load(Ordering::SeqCst), 0);
    assert_eq!(h.bus.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn run_helper_uses_direct_resolver() {
    let bus = ScriptedBus::default();
    let store = Arc::new(MemoryStore::new());
    let resolver = build_resolver(ResolverKind::Direct, store.clone());
    let cancel = CancellationToken::new();
    bus.push(message(1, status("req-1", "received")));
    bus.push(message(2, status("req-2", "received")));

    let task = tokio::spawn(tracker_consumer::run(
        cancel.clone(),
        bus.clone(),
        store.clone(),
        resolver,
    ));
    while bus.pending() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();
    task.await.unwrap();

    // No cache: the second message looks "received" up again.
    assert_eq!(store.lookups(DimensionKind::Status), 2);
    assert_eq!(bus.closes.load(Ordering::SeqCst), 1);
}
