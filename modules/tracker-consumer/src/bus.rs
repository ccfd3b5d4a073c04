//! Message bus seam.

use std::time::Duration;

use async_trait::async_trait;

/// A record read from the status topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Everything a poll can surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Message(BusMessage),
    /// A non-fatal client error; the connection stays usable.
    Error(String),
    /// Result of an offset commit. `error` is set when the commit failed.
    OffsetsCommitted { error: Option<String> },
    /// Anything else the client reports.
    Other(String),
}

/// A subscribed bus connection.
#[async_trait]
pub trait BusConnection: Send {
    /// Wait up to `timeout` for the next event. `None` means nothing arrived.
    async fn poll(&mut self, timeout: Duration) -> Option<BusEvent>;

    /// Leave the consumer group and release the connection.
    async fn close(&mut self);
}
