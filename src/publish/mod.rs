//! Publishing module
//!
//! This module handles everything that leaves the crawler:
//! - Building the outbound article record
//! - Hash-based partition routing
//! - The broker interface and its Redis implementation
//! - The end-of-session completion signal

mod broker;
mod partition;
mod publisher;
mod record;

pub use broker::{Broker, RedisBroker};
pub use partition::partition_for;
pub use publisher::Publisher;
pub use record::{ArticleRecord, CompletionSignal};

use thiserror::Error;

/// Errors raised by a broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while publishing an article
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Missing {missing} for {url}")]
    MissingData { url: String, missing: &'static str },

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to publish: {0}")]
    Broker(#[from] BrokerError),
}

impl PublishError {
    /// Returns true if the article was skipped for lack of a date or text
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::MissingData { .. })
    }
}
