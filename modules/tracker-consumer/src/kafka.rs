//! Kafka-backed [`BusConnection`].

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, Message, TopicPartitionList};
use tokio::sync::mpsc;
use tracing::info;
use tracker_common::{KafkaConfig, Result, TrackerError};

use crate::bus::{BusConnection, BusEvent, BusMessage};

/// Forwards commit results into the poll stream.
struct CommitContext {
    commits: mpsc::UnboundedSender<BusEvent>,
}

impl ClientContext for CommitContext {}

impl ConsumerContext for CommitContext {
    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        let _ = self.commits.send(BusEvent::OffsetsCommitted {
            error: result.err().map(|e| e.to_string()),
        });
    }
}

pub struct KafkaBus {
    consumer: StreamConsumer<CommitContext>,
    commits: mpsc::UnboundedReceiver<BusEvent>,
}

impl KafkaBus {
    /// Create the consumer and subscribe to the configured topic.
    pub fn connect(config: &KafkaConfig) -> Result<Self> {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set(
                "auto.commit.interval.ms",
                config.auto_commit_interval_ms.to_string(),
            )
            .set("allow.auto.create.topics", "true");

        if let Some(mechanism) = &config.sasl_mechanism {
            client
                .set(
                    "security.protocol",
                    config.security_protocol.as_deref().unwrap_or("sasl_ssl"),
                )
                .set("sasl.mechanism", mechanism);
            if let Some(username) = &config.sasl_username {
                client.set("sasl.username", username);
            }
            if let Some(password) = &config.sasl_password {
                client.set("sasl.password", password);
            }
        } else if let Some(protocol) = &config.security_protocol {
            client.set("security.protocol", protocol);
        }
        if let Some(ca) = &config.ca_location {
            client.set("ssl.ca.location", ca);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let consumer: StreamConsumer<CommitContext> = client
            .create_with_context(CommitContext { commits: tx })
            .map_err(|e| TrackerError::Bus(format!("failed to create consumer: {e}")))?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| TrackerError::Bus(format!("failed to subscribe to {}: {e}", config.topic)))?;

        info!(topic = config.topic.as_str(), "Connected to Kafka");

        Ok(Self {
            consumer,
            commits: rx,
        })
    }
}

#[async_trait]
impl BusConnection for KafkaBus {
    async fn poll(&mut self, timeout: Duration) -> Option<BusEvent> {
        if let Ok(commit) = self.commits.try_recv() {
            return Some(commit);
        }

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => None,
            Ok(Ok(message)) => Some(BusEvent::Message(BusMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
            Ok(Err(e)) => Some(BusEvent::Error(e.to_string())),
        }
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        info!("Kafka consumer closed");
    }
}
