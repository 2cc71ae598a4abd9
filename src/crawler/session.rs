//! Crawl session orchestration
//!
//! A session crawls one calendar day. It walks `Starting → Crawling →
//! Draining → Completed`, wiring engine callbacks into the article store and
//! the publisher, and reacting to fetch failures by retrying or
//! quarantining the proxy that served them.

use crate::config::CrawlerConfig;
use crate::crawler::parser::parse_article_date;
use crate::crawler::{
    CrawlEngine, CrawlReport, Element, EngineError, PageHandler, Request, RequestFailure, VisitError,
    Visitor,
};
use crate::proxy::{PoolCommand, ProxyManager};
use crate::publish::{CompletionSignal, Publisher};
use crate::state::{ArticleStore, SessionPhase};
use crate::url::{is_followable_link, rewrite_more_link, seed_url, DayKey, UrlFilters};
use crate::{ConfigError, SessionError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// How a failed fetch is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Back off, then retry the same request
    RateLimited,

    /// Quarantine the proxy that served the request; no retry
    ProxyFailure,

    /// Log and abandon
    Other,
}

/// Classifies a fetch failure by status and message
///
/// # Example
///
/// ```
/// use newsreel::crawler::{classify_failure, FailureClass};
///
/// assert_eq!(classify_failure(Some(429), "429 Too Many Requests"), FailureClass::RateLimited);
/// assert_eq!(classify_failure(None, "502 Bad Gateway"), FailureClass::ProxyFailure);
/// assert_eq!(classify_failure(Some(404), "404 Not Found"), FailureClass::Other);
/// ```
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureClass {
    match status {
        Some(429) => return FailureClass::RateLimited,
        Some(502..=504) => return FailureClass::ProxyFailure,
        _ => {}
    }

    let message = message.to_lowercase();
    if message.contains("too many requests") || message.contains("rate limit") {
        FailureClass::RateLimited
    } else if message.contains("bad gateway")
        || message.contains("gateway timeout")
        || message.contains("service unavailable")
        || message.contains("proxy")
    {
        FailureClass::ProxyFailure
    } else {
        FailureClass::Other
    }
}

/// Session tunables
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub site_root: Url,
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_retries: u32,
}

impl SessionSettings {
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, ConfigError> {
        let site_root = Url::parse(&config.site_root).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid site-root '{}': {}", config.site_root, e))
        })?;

        Ok(Self {
            site_root,
            rate_limit_backoff: config.rate_limit_backoff(),
            max_rate_limit_retries: config.max_rate_limit_retries,
        })
    }
}

/// Outcome counters of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Articles published
    pub published: u64,

    /// Articles skipped for a missing date or text
    pub incomplete: u64,

    /// Articles lost to broker failures
    pub publish_failures: u64,

    /// Requests re-queued after rate limiting
    pub retries: u64,

    /// Proxies reported as failing
    pub proxy_failures: u64,

    /// Panics caught inside the crawl
    pub panics: u64,

    /// Pages still holding fragments when the session ended, discarded
    pub unpublished: u64,
}

/// Result of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub signal: CompletionSignal,
    pub stats: SessionStats,
    pub crawl: CrawlReport,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    incomplete: AtomicU64,
    publish_failures: AtomicU64,
    retries: AtomicU64,
    proxy_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            published: self.published.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            proxy_failures: self.proxy_failures.load(Ordering::Relaxed),
            panics: 0,
            unpublished: 0,
        }
    }
}

/// Engine callbacks for one session
struct SessionHandler {
    day: DayKey,
    articles: ArticleStore,
    publisher: Publisher,
    proxies: ProxyManager,
    settings: SessionSettings,
    counters: Counters,
    cancel: CancellationToken,
}

impl SessionHandler {
    fn visit(&self, visitor: &Visitor, url: &str) {
        match visitor.visit(url) {
            Ok(()) => tracing::trace!(url, "Queued"),
            Err(VisitError::AlreadyVisited(_)) | Err(VisitError::Forbidden(_)) => {}
            Err(e) => tracing::debug!(url, error = %e, "Link not queued"),
        }
    }

    fn append(&self, url: &str, text: String) {
        if self.articles.append_fragment(url, text) {
            tracing::debug!(url, "Fragment seen before for this page, appending anyway");
        }
    }

    async fn publish(&self, url: &str) {
        match self.publisher.publish(url, &self.articles).await {
            Ok(partition) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                self.articles.remove(url);
                tracing::info!(day = %self.day, url, partition, "Article published");
            }
            Err(e) if e.is_missing_data() => {
                self.counters.incomplete.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(day = %self.day, error = %e, "Skipping incomplete article");
            }
            Err(e) => {
                self.counters.publish_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(day = %self.day, url, error = %e, "Failed to publish article");
            }
        }
    }

    async fn back_off_and_retry(&self, request: &Request, visitor: &Visitor) {
        if request.attempt >= self.settings.max_rate_limit_retries {
            tracing::warn!(
                url = %request.url,
                attempts = request.attempt + 1,
                "Rate limited too many times, giving up on request"
            );
            return;
        }

        tracing::warn!(
            url = %request.url,
            backoff_secs = self.settings.rate_limit_backoff.as_secs(),
            "Rate limited, backing off"
        );

        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.settings.rate_limit_backoff) => {}
        }

        match visitor.retry(request) {
            Ok(()) => {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(url = %request.url, error = %e, "Could not retry request"),
        }
    }
}

#[async_trait]
impl PageHandler for SessionHandler {
    async fn on_element(&self, request: &Request, element: Element, visitor: &Visitor) {
        let url = request.url.as_str();

        match element {
            Element::Link { href } => {
                if is_followable_link(&href) {
                    self.visit(visitor, &href);
                }
            }
            Element::Title { text } | Element::Body { text } => self.append(url, text),
            Element::Date { text } => match parse_article_date(&text) {
                Ok(date) => self.articles.record_date(url, date),
                Err(e) => tracing::warn!(url, error = %e, "Failed to parse article date"),
            },
            Element::Recommendation => self.publish(url).await,
            Element::LoadMore { data_url: fragment } | Element::ItemsLoaded { next_url: fragment } => {
                match rewrite_more_link(url, &fragment) {
                    Some(next) => self.visit(visitor, &next),
                    None => tracing::debug!(url, fragment = %fragment, "Pagination link could not be rewritten"),
                }
            }
        }
    }

    async fn on_error(&self, failure: RequestFailure, visitor: &Visitor) {
        match classify_failure(failure.status, &failure.message) {
            FailureClass::RateLimited => self.back_off_and_retry(&failure.request, visitor).await,
            FailureClass::ProxyFailure => {
                tracing::warn!(
                    url = %failure.request.url,
                    error = %failure.message,
                    "Proxy failure, abandoning request"
                );
                if let Some(proxy) = failure.request.proxy {
                    self.counters.proxy_failures.fetch_add(1, Ordering::Relaxed);
                    self.proxies.submit(PoolCommand::Delete(proxy)).await;
                }
            }
            FailureClass::Other => tracing::warn!(
                url = %failure.request.url,
                status = ?failure.status,
                error = %failure.message,
                "Request failed"
            ),
        }
    }
}

/// Runs crawl sessions, one day at a time
pub struct Scraper {
    engine: Arc<dyn CrawlEngine>,
    publisher: Publisher,
    proxies: ProxyManager,
    settings: SessionSettings,
}

impl Scraper {
    pub fn new(
        engine: Arc<dyn CrawlEngine>,
        publisher: Publisher,
        proxies: ProxyManager,
        settings: SessionSettings,
    ) -> Self {
        Self {
            engine,
            publisher,
            proxies,
            settings,
        }
    }

    /// Crawls one day and publishes its articles
    ///
    /// Only a future day or a failure to start the engine is an error.
    /// Everything that goes wrong after crawling begins (bad pages, broker
    /// outages, panics inside callbacks) is logged and counted, and the
    /// session still completes.
    pub async fn scrape_day(
        &self,
        day: DayKey,
        cancel: &CancellationToken,
    ) -> Result<SessionReport, SessionError> {
        let started = Instant::now();
        let mut phase = SessionPhase::Starting;
        tracing::info!(day = %day, date = %day.human(), "Starting session");

        let today = DayKey::today();
        if day > today {
            return Err(SessionError::FutureDay {
                day: day.to_string(),
                today: today.to_string(),
            });
        }

        let filters = UrlFilters::for_day(&self.settings.site_root, day)?;
        let seed = seed_url(&self.settings.site_root, day)?;

        let handler = Arc::new(SessionHandler {
            day,
            articles: ArticleStore::new(),
            publisher: self.publisher.clone(),
            proxies: self.proxies.clone(),
            settings: self.settings.clone(),
            counters: Counters::default(),
            cancel: cancel.clone(),
        });

        advance(&mut phase, SessionPhase::Crawling, day);
        let crawl = self
            .engine
            .start(seed, filters, handler.clone(), cancel.clone())?;

        advance(&mut phase, SessionPhase::Draining, day);
        let (crawl, crashed) = match crawl.wait().await {
            Ok(report) => (report, 0),
            Err(EngineError::Panicked(msg)) => {
                tracing::error!(day = %day, panic = %msg, "Session panicked, completing anyway");
                (CrawlReport::default(), 1)
            }
            Err(e) => {
                tracing::error!(day = %day, error = %e, "Crawl ended abnormally");
                (CrawlReport::default(), 0)
            }
        };

        advance(&mut phase, SessionPhase::Completed, day);
        let mut stats = handler.counters.snapshot();
        stats.panics = crawl.panics + crashed;

        let signal = CompletionSignal {
            day: day.to_string(),
            count: stats.published,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if let Err(e) = self.publisher.publish_completion(&signal).await {
            tracing::error!(day = %day, error = %e, "Failed to publish completion signal");
        }

        stats.unpublished = handler.articles.len() as u64;
        handler.articles.clear();

        tracing::info!(
            day = %day,
            published = stats.published,
            incomplete = stats.incomplete,
            publish_failures = stats.publish_failures,
            retries = stats.retries,
            proxy_failures = stats.proxy_failures,
            panics = stats.panics,
            unpublished = stats.unpublished,
            requests = crawl.requests,
            elapsed_ms = signal.elapsed_ms,
            "Session completed"
        );

        Ok(SessionReport {
            signal,
            stats,
            crawl,
        })
    }
}

fn advance(phase: &mut SessionPhase, next: SessionPhase, day: DayKey) {
    debug_assert!(phase.can_transition_to(next), "{} -> {}", phase, next);
    tracing::debug!(day = %day, from = %phase, to = %next, "Session phase");
    *phase = next;
}
