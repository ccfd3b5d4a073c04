//! Payload status consumer.
//!
//! Polls the bus, turns each status message into a payload upsert plus a
//! status-event row, and stops cleanly when its cancellation token fires.
//!
//! The bus is abstracted behind [`BusConnection`]; the Kafka implementation
//! lives behind the `kafka` feature.

pub mod bus;
pub mod event_loop;
pub mod handler;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod metrics;
pub mod shutdown;

pub use bus::{BusConnection, BusEvent, BusMessage};
pub use event_loop::{run, EventLoop, POLL_TIMEOUT};
pub use handler::{MessageHandler, Recorded};
pub use metrics::ConsumerMetrics;
