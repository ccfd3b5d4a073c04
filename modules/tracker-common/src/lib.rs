pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use config::{Config, KafkaConfig, ResolverKind};
pub use error::{Result, TrackerError};
pub use message::{StatusMessage, StatusUpdate};
pub use types::*;
