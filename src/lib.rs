//! Newsreel: a day-by-day news crawler behind a rotating proxy pool
//!
//! This crate crawls a news site one calendar day at a time, routes every
//! fetch through a pool of HTTP proxies that quarantines and re-admits failing
//! endpoints, accumulates article fragments as pages are parsed, and publishes
//! completed articles onto partitioned broker channels.

pub mod config;
pub mod crawler;
pub mod proxy;
pub mod publish;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Newsreel operations
#[derive(Debug, Error)]
pub enum NewsreelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Broker error: {0}")]
    Broker(#[from] publish::BrokerError),

    #[error("Engine error: {0}")]
    Engine(#[from] crawler::EngineError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),
}

/// Configuration-specific errors
///
/// These are the only errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No proxy endpoints configured")]
    EmptyProxyList,

    #[error("Invalid proxy endpoint '{0}'")]
    InvalidProxy(String),

    #[error("Partition count must be >= 1, got {0}")]
    InvalidPartitionCount(u32),
}

/// Errors that stop a crawl session before it starts crawling
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Day {day} is in the future (today is {today})")]
    FutureDay { day: String, today: String },

    #[error("Failed to build day URLs: {0}")]
    Url(#[from] UrlError),

    #[error("Crawl engine failed: {0}")]
    Engine(#[from] crawler::EngineError),
}

/// URL and day-key errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid day key '{0}', expected YYYYMMDD")]
    InvalidDayKey(String),

    #[error("Invalid URL filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

/// Result type alias for Newsreel operations
pub type Result<T> = std::result::Result<T, NewsreelError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run, Scraper};
pub use proxy::{PoolCommand, ProxyEndpoint, ProxyManager};
pub use publish::{CompletionSignal, Publisher};
pub use state::{PendingArticle, SessionPhase};
pub use crate::url::DayKey;
