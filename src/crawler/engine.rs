//! Crawl engine interface
//!
//! The session orchestrator never fetches pages itself. It hands an engine
//! a seed URL, the day's URL filters and a [`PageHandler`]; the engine
//! fetches pages, matches elements and calls the handler back from its
//! workers. [`Visitor`] is the handler's way to push more URLs into the
//! engine's frontier.

use crate::proxy::{ProxyEndpoint, ProxyManager};
use crate::url::UrlFilters;
use async_trait::async_trait;
use dashmap::DashSet;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Errors raised by a crawl engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Seed URL rejected: {0}")]
    Seed(#[from] VisitError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Crawl task panicked: {0}")]
    Panicked(String),

    #[error("Crawl task was aborted")]
    Aborted,
}

/// Why a URL was not queued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisitError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("URL not allowed by filters: {0}")]
    Forbidden(String),

    #[error("URL already visited: {0}")]
    AlreadyVisited(String),

    #[error("crawl frontier is closed")]
    Closed,
}

/// A page fetch, as seen by callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: Url,

    /// The proxy the fetch went through, once one was selected
    pub proxy: Option<ProxyEndpoint>,

    /// 0 for the first try, incremented on every retry
    pub attempt: u32,
}

impl Request {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            proxy: None,
            attempt: 0,
        }
    }

    /// The same request, queued for another attempt
    pub fn retried(&self) -> Self {
        Self {
            url: self.url.clone(),
            proxy: None,
            attempt: self.attempt + 1,
        }
    }
}

/// An element matched on a fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// Absolute URL of an `<a href>` link
    Link { href: String },

    /// Text of the article date block
    Date { text: String },

    /// Article title text
    Title { text: String },

    /// One article body block
    Body { text: String },

    /// The recommendation block that closes an article page
    Recommendation,

    /// "Load more" button carrying a root-relative fragment
    LoadMore { data_url: String },

    /// Loaded list chunk carrying the next chunk's fragment
    ItemsLoaded { next_url: String },
}

/// A fetch that did not produce a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub request: Request,

    /// HTTP status, when a response arrived
    pub status: Option<u16>,

    /// Human-readable cause, e.g. `429 Too Many Requests`
    pub message: String,
}

/// Totals reported by an engine once its frontier is drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Requests that were attempted
    pub requests: u64,

    /// Requests that ended in a failure callback
    pub failures: u64,

    /// Worker tasks that panicked
    pub panics: u64,
}

/// Callbacks invoked by an engine for every fetched page
#[async_trait]
pub trait PageHandler: Send + Sync {
    /// Called once per matched element, in match order
    async fn on_element(&self, request: &Request, element: Element, visitor: &Visitor);

    /// Called when a fetch fails
    async fn on_error(&self, failure: RequestFailure, visitor: &Visitor);
}

/// Source of proxies for fetch workers
#[async_trait]
pub trait ProxySelector: Send + Sync {
    /// Returns the proxy for the next fetch, or `None` on shutdown
    async fn select(&self) -> Option<ProxyEndpoint>;
}

#[async_trait]
impl ProxySelector for ProxyManager {
    async fn select(&self) -> Option<ProxyEndpoint> {
        ProxyManager::select(self).await
    }
}

/// A crawling engine
pub trait CrawlEngine: Send + Sync {
    /// Queues the seed and starts crawling in the background
    ///
    /// Fails without starting when the seed is rejected.
    fn start(
        &self,
        seed: Url,
        filters: UrlFilters,
        handler: Arc<dyn PageHandler>,
        cancel: CancellationToken,
    ) -> Result<CrawlHandle, EngineError>;
}

/// A running crawl
pub struct CrawlHandle {
    task: JoinHandle<CrawlReport>,
}

impl CrawlHandle {
    pub fn new(task: JoinHandle<CrawlReport>) -> Self {
        Self { task }
    }

    /// Blocks until there is no queued or in-flight work left
    pub async fn wait(self) -> Result<CrawlReport, EngineError> {
        match self.task.await {
            Ok(report) => Ok(report),
            Err(e) if e.is_panic() => Err(EngineError::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(EngineError::Aborted),
        }
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to an engine's frontier
///
/// `visit` applies the URL filters and skips URLs already queued during the
/// crawl; `retry` re-queues a request regardless.
#[derive(Clone)]
pub struct Visitor {
    queue: mpsc::UnboundedSender<Request>,
    visited: Arc<DashSet<String>>,
    filters: Arc<UrlFilters>,
}

impl Visitor {
    /// Creates a visitor and the receiving end of its frontier
    pub fn channel(filters: UrlFilters) -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let visitor = Self {
            queue: tx,
            visited: Arc::new(DashSet::new()),
            filters: Arc::new(filters),
        };
        (visitor, rx)
    }

    /// Queues a URL for its first visit
    pub fn visit(&self, url: &str) -> Result<(), VisitError> {
        let parsed = Url::parse(url).map_err(|_| VisitError::InvalidUrl(url.to_string()))?;

        if !self.filters.allows(parsed.as_str()) {
            return Err(VisitError::Forbidden(parsed.to_string()));
        }

        if !self.visited.insert(parsed.to_string()) {
            return Err(VisitError::AlreadyVisited(parsed.to_string()));
        }

        self.queue
            .send(Request::new(parsed))
            .map_err(|_| VisitError::Closed)
    }

    /// Queues another attempt of a request that already ran
    pub fn retry(&self, request: &Request) -> Result<(), VisitError> {
        self.queue
            .send(request.retried())
            .map_err(|_| VisitError::Closed)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}
