use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Newsreel
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub crawler: CrawlerConfig,
    pub publish: PublishConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Proxy pool and recovery prober configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Proxy endpoints as `host:port` or full `scheme://host:port`
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Seconds between recovery probes of quarantined proxies
    #[serde(rename = "recover-interval", default = "default_recover_interval")]
    pub recover_interval: u64,

    /// Known-good URL fetched through a quarantined proxy to test it
    #[serde(rename = "probe-url", default = "default_probe_url")]
    pub probe_url: String,

    /// Timeout for a single probe request (seconds)
    #[serde(rename = "probe-timeout", default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Capacity of the pool command queue
    #[serde(rename = "command-buffer", default = "default_command_buffer")]
    pub command_buffer: usize,
}

/// Crawl session behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Root of the news site, e.g. `https://ria.ru`
    #[serde(rename = "site-root", default = "default_site_root")]
    pub site_root: String,

    /// Maximum number of concurrent page fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Fixed delay before each request (milliseconds)
    #[serde(rename = "request-delay", default)]
    pub request_delay: u64,

    /// Upper bound of the random jitter added to the delay (milliseconds)
    #[serde(rename = "request-jitter", default)]
    pub request_jitter: u64,

    /// Timeout for a single page fetch (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// How long a worker sleeps after being rate limited (seconds)
    #[serde(rename = "rate-limit-backoff", default = "default_rate_limit_backoff")]
    pub rate_limit_backoff: u64,

    /// How many times a rate-limited request is retried before it is dropped
    #[serde(
        rename = "max-rate-limit-retries",
        default = "default_max_rate_limit_retries"
    )]
    pub max_rate_limit_retries: u32,

    /// User-Agent header sent with every page fetch
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Broker publishing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Redis connection URL, e.g. `redis://:password@127.0.0.1:6379`
    #[serde(rename = "redis-url")]
    pub redis_url: String,

    /// Base channel name; articles go to `{channel}:{partition}`
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Number of article partitions
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

/// Day-by-day driver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// First day to crawl (`YYYYMMDD`); defaults to today
    #[serde(rename = "start-date", default)]
    pub start_date: Option<String>,

    /// Seconds to wait before re-crawling the current day
    #[serde(rename = "idle-sleep", default = "default_idle_sleep")]
    pub idle_sleep: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            idle_sleep: default_idle_sleep(),
        }
    }
}

impl ProxyConfig {
    pub fn recover_interval(&self) -> Duration {
        Duration::from_secs(self.recover_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn request_jitter(&self) -> Duration {
        Duration::from_millis(self.request_jitter)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff)
    }
}

impl ScheduleConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_secs(self.idle_sleep)
    }
}

fn default_recover_interval() -> u64 {
    300
}

fn default_probe_url() -> String {
    "https://ria.ru".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_command_buffer() -> usize {
    10
}

fn default_site_root() -> String {
    "https://ria.ru".to_string()
}

fn default_concurrency() -> u32 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_backoff() -> u64 {
    60
}

fn default_max_rate_limit_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!("newsreel/{}", env!("CARGO_PKG_VERSION"))
}

fn default_channel() -> String {
    "scrapper".to_string()
}

fn default_partitions() -> u32 {
    5
}

fn default_idle_sleep() -> u64 {
    3600
}
