//! HTTP fetcher implementation
//!
//! This module handles the HTTP side of a page fetch:
//! - Building one HTTP client per proxy endpoint
//! - GET requests for page content
//! - Turning non-2xx responses and transport errors into failure messages
//!   that name their cause

use crate::config::CrawlerConfig;
use crate::proxy::ProxyEndpoint;
use reqwest::{Client, Proxy, StatusCode};
use std::time::Duration;

/// Settings shared by every fetch of a crawl
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// Page body content
        body: String,
    },

    /// The server (or the proxy) answered with a non-2xx status
    HttpError {
        status_code: u16,
        /// Status line, e.g. `429 Too Many Requests`
        message: String,
    },

    /// No response arrived
    NetworkError { error: String },
}

/// Builds an HTTP client routing every request through `proxy`
///
/// # Example
///
/// ```
/// use newsreel::crawler::{build_http_client, FetchSettings};
/// use newsreel::ProxyEndpoint;
/// use std::time::Duration;
///
/// let settings = FetchSettings {
///     user_agent: "newsreel/1.0".to_string(),
///     timeout: Duration::from_secs(30),
/// };
/// let proxy = ProxyEndpoint::parse("127.0.0.1:3128").unwrap();
/// assert!(build_http_client(&proxy, &settings).is_ok());
/// ```
pub fn build_http_client(
    proxy: &ProxyEndpoint,
    settings: &FetchSettings,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
        .proxy(Proxy::all(proxy.url().as_str())?)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx with readable body | Success |
/// | any other status | HttpError with the status line |
/// | timeout | NetworkError "request timeout" |
/// | connection to the proxy failed | NetworkError mentioning the proxy |
/// | anything else | NetworkError with the transport error |
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return classify_transport_error(&e),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
            message: status_line(status),
        };
    }

    let final_url = response.url().to_string();
    match response.text().await {
        Ok(body) => FetchResult::Success { final_url, body },
        Err(e) => classify_transport_error(&e),
    }
}

/// Formats a status the way servers report it, e.g. `502 Bad Gateway`
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn classify_transport_error(e: &reqwest::Error) -> FetchResult {
    let error = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        // Every request goes through a proxy, so a connect failure is the proxy's
        format!("proxy connection failed: {}", e)
    } else {
        e.to_string()
    };
    FetchResult::NetworkError { error }
}
