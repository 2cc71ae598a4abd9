//! Configuration module for Newsreel
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use newsreel::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("newsreel.toml")).unwrap();
//! println!("Proxies: {}", config.proxy.endpoints.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, ProxyConfig, PublishConfig, ScheduleConfig};

// Re-export parser functions
pub use parser::{
    apply_proxy_override, compute_config_hash, load_config, load_config_with_hash,
    PROXY_URLS_ENV,
};
pub use validation::validate;
