use crate::url::DayKey;
use crate::UrlError;
use regex::Regex;
use url::Url;

/// URL-pattern filters restricting a crawl to a single day
///
/// A URL is visitable when it matches at least one pattern. An empty filter
/// set allows everything.
#[derive(Debug, Clone, Default)]
pub struct UrlFilters {
    patterns: Vec<Regex>,
}

impl UrlFilters {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Builds the filters for one day of the given site
    ///
    /// Two families of URLs are allowed:
    /// - article and listing pages dated for the day, on the site host or
    ///   any of its single-label subdomains (`https://sport.ria.ru/20250305/...`)
    /// - the pagination ("load more") service endpoints for the day
    ///   (`https://ria.ru/services/20250305/...`)
    pub fn for_day(site_root: &Url, day: DayKey) -> Result<Self, UrlError> {
        let host = site_root
            .host_str()
            .ok_or_else(|| UrlError::Parse(format!("{} has no host", site_root)))?;
        let authority = match site_root.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let scheme = regex::escape(site_root.scheme());
        let authority = regex::escape(&authority);

        let articles = Regex::new(&format!(
            r"^{}://([a-z]+\.)?{}/{}[^?]",
            scheme, authority, day
        ))?;
        let services = Regex::new(&format!(r"^{}://{}/services/{}", scheme, authority, day))?;

        Ok(Self::new(vec![articles, services]))
    }

    /// Returns true if the URL may be visited
    pub fn allows(&self, url: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(url))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

/// The day's front listing page, where every session starts
pub fn seed_url(site_root: &Url, day: DayKey) -> Result<Url, UrlError> {
    site_root
        .join(&format!("/{}/", day))
        .map_err(|e| UrlError::Parse(e.to_string()))
}

/// Discovered links are only followed when they carry no query string
pub fn is_followable_link(link: &str) -> bool {
    !link.is_empty() && !link.contains('?')
}
