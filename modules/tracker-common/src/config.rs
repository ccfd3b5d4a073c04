use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, TrackerError};

/// Which dimension resolver the consumer runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverKind {
    /// Every lookup goes to the database.
    Direct,
    /// Lookups go through a 12-hour in-process cache in front of the database.
    #[default]
    Cached,
}

impl FromStr for ResolverKind {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "db" => Ok(Self::Direct),
            "cached" | "db_with_cache" => Ok(Self::Cached),
            other => Err(TrackerError::Config(format!(
                "unknown dimension resolver {other:?} (expected \"direct\" or \"cached\")"
            ))),
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Cached => f.write_str("cached"),
        }
    }
}

/// Kafka consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topic: String,
    pub auto_offset_reset: String,
    pub auto_commit_interval_ms: u64,

    // Managed-Kafka auth; all unset for plaintext brokers.
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ca_location: Option<String>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Bus
    pub kafka: KafkaConfig,

    // Consumer
    pub resolver: ResolverKind,

    // Metrics (0 disables the exporter)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or_else(|| {
                TrackerError::Config("DATABASE_URL environment variable is required".into())
            })?,
            database_max_connections: parse_number(
                "DATABASE_MAX_CONNECTIONS",
                &or("DATABASE_MAX_CONNECTIONS", "5"),
            )?,
            kafka: KafkaConfig {
                bootstrap_servers: or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
                group_id: or("KAFKA_GROUP_ID", "payload-tracker"),
                topic: or("KAFKA_TOPIC", "platform.payload-status"),
                auto_offset_reset: or("KAFKA_AUTO_OFFSET_RESET", "latest"),
                auto_commit_interval_ms: parse_number(
                    "KAFKA_AUTO_COMMIT_INTERVAL_MS",
                    &or("KAFKA_AUTO_COMMIT_INTERVAL_MS", "5000"),
                )?,
                security_protocol: var("KAFKA_SECURITY_PROTOCOL"),
                sasl_mechanism: var("KAFKA_SASL_MECHANISM"),
                sasl_username: var("KAFKA_SASL_USERNAME"),
                sasl_password: var("KAFKA_SASL_PASSWORD"),
                ca_location: var("KAFKA_CA_LOCATION"),
            },
            resolver: or("DIMENSION_RESOLVER", "cached").parse()?,
            metrics_port: parse_number("METRICS_PORT", &or("METRICS_PORT", "9000"))?,
        })
    }

    /// Log the effective configuration without credentials.
    pub fn log_redacted(&self) {
        info!(
            bootstrap_servers = self.kafka.bootstrap_servers.as_str(),
            group_id = self.kafka.group_id.as_str(),
            topic = self.kafka.topic.as_str(),
            auto_offset_reset = self.kafka.auto_offset_reset.as_str(),
            sasl = self.kafka.sasl_mechanism.as_deref().unwrap_or("none"),
            resolver = %self.resolver,
            database_max_connections = self.database_max_connections,
            metrics_port = self.metrics_port,
            "Loaded configuration"
        );
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TrackerError::Config(format!("{key} must be a number, got {raw:?}")))
}
