use crate::config::types::{Config, CrawlerConfig, ProxyConfig, PublishConfig, ScheduleConfig};
use crate::proxy::ProxyEndpoint;
use crate::url::DayKey;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_proxy_config(&config.proxy)?;
    validate_crawler_config(&config.crawler)?;
    validate_publish_config(&config.publish)?;
    validate_schedule_config(&config.schedule)?;
    Ok(())
}

/// Validates proxy pool configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.endpoints.is_empty() {
        return Err(ConfigError::EmptyProxyList);
    }

    for raw in &config.endpoints {
        ProxyEndpoint::parse(raw)?;
    }

    if config.recover_interval == 0 {
        return Err(ConfigError::Validation(
            "recover-interval must be > 0 seconds".to_string(),
        ));
    }

    if config.probe_timeout == 0 {
        return Err(ConfigError::Validation(
            "probe-timeout must be > 0 seconds".to_string(),
        ));
    }

    if config.command_buffer == 0 {
        return Err(ConfigError::Validation(
            "command-buffer must be >= 1".to_string(),
        ));
    }

    validate_http_url("probe-url", &config.probe_url)
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request-timeout must be > 0 seconds".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    validate_http_url("site-root", &config.site_root)
}

/// Validates broker publishing configuration
fn validate_publish_config(config: &PublishConfig) -> Result<(), ConfigError> {
    if config.partitions < 1 {
        return Err(ConfigError::InvalidPartitionCount(config.partitions));
    }

    if config.channel.is_empty() {
        return Err(ConfigError::Validation("channel cannot be empty".to_string()));
    }

    if config.redis_url.is_empty() {
        return Err(ConfigError::Validation(
            "redis-url cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the day-by-day schedule
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    let Some(raw) = &config.start_date else {
        return Ok(());
    };

    let day = DayKey::parse(raw)
        .map_err(|e| ConfigError::Validation(format!("start-date: {}", e)))?;

    let today = DayKey::today();
    if day > today {
        return Err(ConfigError::Validation(format!(
            "start-date {} can't be later than today {}",
            day, today
        )));
    }

    Ok(())
}

/// Checks that a configured URL parses and uses http(s)
fn validate_http_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, raw
        )));
    }

    Ok(())
}
