//! Consumer counters.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `payload_tracker_consumed_messages_total` | Counter | Messages taken off the bus |
//! | `payload_tracker_consume_errors_total` | Counter | Transient bus errors |
//! | `payload_tracker_dimension_cache_entries` | Gauge | Live resolver cache entries, by `dimension` |
//!
//! Each increment goes to the `metrics` facade and to an in-process atomic so
//! the loop can report totals without a recorder installed.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use tracker_common::DimensionKind;
use tracker_store::CacheStats;

pub mod names {
    /// Counter: messages consumed from the status topic.
    pub const CONSUMED_MESSAGES: &str = "payload_tracker_consumed_messages_total";
    /// Counter: transient errors reported by the bus client.
    pub const CONSUME_ERRORS: &str = "payload_tracker_consume_errors_total";
    /// Gauge: live dimension cache entries, labelled by dimension.
    pub const DIMENSION_CACHE_ENTRIES: &str = "payload_tracker_dimension_cache_entries";
}

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(
        names::CONSUMED_MESSAGES,
        "Messages consumed from the payload status topic"
    );
    describe_counter!(
        names::CONSUME_ERRORS,
        "Transient errors reported by the message bus client"
    );
    describe_gauge!(
        names::DIMENSION_CACHE_ENTRIES,
        "Live entries in the dimension resolver cache"
    );
}

/// Publish resolver cache sizes.
pub fn record_cache_stats(stats: &CacheStats) {
    for kind in DimensionKind::ALL {
        gauge!(names::DIMENSION_CACHE_ENTRIES, "dimension" => kind.as_str())
            .set(stats.get(kind) as f64);
    }
}

#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    consumed: AtomicU64,
    errors: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        counter!(names::CONSUMED_MESSAGES).increment(1);
    }

    pub fn consume_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(names::CONSUME_ERRORS).increment(1);
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
