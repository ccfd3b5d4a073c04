//! The consume loop.
//!
//! One message at a time: poll → dispatch → resolve → write → poll. The
//! cancellation token is checked before every poll, and polls are bounded, so
//! shutdown waits for at most one poll plus whatever write is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tracker_common::TrackerError;
use tracker_store::{DimensionResolver, PayloadWriter};

use crate::bus::{BusConnection, BusEvent, BusMessage};
use crate::handler::MessageHandler;
use crate::metrics::ConsumerMetrics;

/// Upper bound on a single bus poll.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct EventLoop<B> {
    bus: B,
    handler: MessageHandler,
    metrics: Arc<ConsumerMetrics>,
    poll_timeout: Duration,
}

impl<B: BusConnection> EventLoop<B> {
    pub fn new(
        bus: B,
        writer: Arc<dyn PayloadWriter>,
        resolver: Arc<dyn DimensionResolver>,
    ) -> Self {
        Self {
            bus,
            handler: MessageHandler::new(writer, resolver),
            metrics: Arc::new(ConsumerMetrics::new()),
            poll_timeout: POLL_TIMEOUT,
        }
    }

    /// Share counters with the caller (health reporting, tests).
    pub fn with_metrics(mut self, metrics: Arc<ConsumerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        self.metrics.clone()
    }

    /// Consume until `cancel` fires, then close the bus connection.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Consumer loop started");

        loop {
            if cancel.is_cancelled() {
                info!("Shutdown requested, leaving consumer loop");
                break;
            }

            let Some(event) = self.bus.poll(self.poll_timeout).await else {
                continue;
            };
            self.dispatch(event).await;
        }

        self.bus.close().await;

        info!(
            consumed = self.metrics.consumed(),
            errors = self.metrics.errors(),
            "Consumer loop stopped"
        );
    }

    async fn dispatch(&self, event: BusEvent) {
        match event {
            BusEvent::Message(message) => {
                self.metrics.message_consumed();
                self.on_message(message).await;
            }
            BusEvent::Error(reason) => {
                self.metrics.consume_error();
                error!(error = reason.as_str(), "Consumer error");
            }
            BusEvent::OffsetsCommitted { error: Some(reason) } => {
                error!(error = reason.as_str(), "Unable to commit offsets");
            }
            BusEvent::OffsetsCommitted { error: None } => {
                trace!("Offsets committed");
            }
            BusEvent::Other(description) => {
                info!(event = description.as_str(), "Ignored bus event");
            }
        }
    }

    // Failures are logged and the message dropped; the bus commits past it.
    async fn on_message(&self, message: BusMessage) {
        match self.handler.on_message(&message.payload).await {
            Ok(recorded) => {
                debug!(
                    partition = message.partition,
                    offset = message.offset,
                    payload_id = recorded.payload_id,
                    "Message processed"
                );
            }
            Err(TrackerError::InvalidMessage(reason)) => {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    reason = reason.as_str(),
                    "Dropping invalid status message"
                );
            }
            Err(e) => {
                error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to record status message"
                );
            }
        }
    }
}

/// Build an [`EventLoop`] with default settings and run it to completion.
pub async fn run<B: BusConnection>(
    cancel: CancellationToken,
    bus: B,
    writer: Arc<dyn PayloadWriter>,
    resolver: Arc<dyn DimensionResolver>,
) {
    EventLoop::new(bus, writer, resolver).run(cancel).await;
}
