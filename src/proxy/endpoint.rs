use crate::ConfigError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use url::Url;

/// A single proxy address
///
/// Identity is the normalized `scheme://host:port` form; credentials embedded
/// in the URL are kept for the HTTP client but never shown or compared.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    url: Url,
    key: String,
}

impl ProxyEndpoint {
    /// Parses a proxy address
    ///
    /// Bare `host:port` entries are treated as plain HTTP proxies.
    ///
    /// # Examples
    ///
    /// ```
    /// use newsreel::proxy::ProxyEndpoint;
    ///
    /// let proxy = ProxyEndpoint::parse("10.0.0.1:3128").unwrap();
    /// assert_eq!(proxy.as_str(), "http://10.0.0.1:3128");
    ///
    /// let same = ProxyEndpoint::parse("HTTP://10.0.0.1:3128/").unwrap();
    /// assert_eq!(proxy, same);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidProxy(raw.to_string()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&with_scheme).map_err(|_| ConfigError::InvalidProxy(raw.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProxy(raw.to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidProxy(raw.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigError::InvalidProxy(raw.to_string()))?;

        let key = format!("{}://{}:{}", url.scheme(), host, port);

        Ok(Self { url, key })
    }

    /// The full proxy URL, including credentials if any
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized identity string
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl PartialEq for ProxyEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ProxyEndpoint {}

impl Hash for ProxyEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for ProxyEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses every configured endpoint, failing on the first malformed one
pub fn parse_endpoints<S: AsRef<str>>(raw: &[S]) -> Result<Vec<ProxyEndpoint>, ConfigError> {
    raw.iter().map(|s| ProxyEndpoint::parse(s.as_ref())).collect()
}
