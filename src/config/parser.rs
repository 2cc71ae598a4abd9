use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable that overrides `[proxy] endpoints`
pub const PROXY_URLS_ENV: &str = "PROXY_URLS";

/// Loads and parses a configuration file from the given path
///
/// Proxy endpoints from the `PROXY_URLS` environment variable (comma
/// separated) replace the ones in the file when the variable is set.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use newsreel::config::load_config;
///
/// let config = load_config(Path::new("newsreel.toml")).unwrap();
/// println!("Partitions: {}", config.publish.partitions);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    apply_proxy_override(&mut config, std::env::var(PROXY_URLS_ENV).ok().as_deref());

    validate(&config)?;

    Ok(config)
}

/// Replaces the configured proxy endpoints with a comma-separated list
///
/// Blank entries are dropped. A missing or blank override leaves the
/// configuration untouched.
pub fn apply_proxy_override(config: &mut Config, raw: Option<&str>) {
    let Some(raw) = raw else {
        return;
    };

    let endpoints: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if !endpoints.is_empty() {
        tracing::debug!(
            "Using {} proxy endpoints from {}",
            endpoints.len(),
            PROXY_URLS_ENV
        );
        config.proxy.endpoints = endpoints;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup to tell configuration revisions apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
