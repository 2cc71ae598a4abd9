//! Concurrent HTTP crawl engine
//!
//! The engine drains its frontier with up to `concurrency` worker tasks.
//! Each worker waits out the request delay, picks a proxy, fetches the page,
//! extracts elements and invokes the page handler for each of them. Handlers
//! push new URLs back into the frontier through the [`Visitor`], so the crawl
//! ends once the frontier is empty and no worker is running.

use crate::config::CrawlerConfig;
use crate::crawler::engine::panic_message;
use crate::crawler::fetcher::{build_http_client, fetch_page, FetchResult, FetchSettings};
use crate::crawler::parser::{extract_elements, Selectors};
use crate::crawler::{
    CrawlEngine, CrawlHandle, CrawlReport, EngineError, PageHandler, ProxySelector, Request,
    RequestFailure, Visitor,
};
use crate::proxy::ProxyEndpoint;
use crate::url::UrlFilters;
use dashmap::DashMap;
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pacing and sizing of a crawl
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub concurrency: usize,
    pub delay: Duration,
    pub jitter: Duration,
    pub fetch: FetchSettings,
}

impl EngineSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1) as usize,
            delay: config.request_delay(),
            jitter: config.request_jitter(),
            fetch: FetchSettings::from_config(config),
        }
    }
}

/// What a worker did with one request
enum WorkerOutcome {
    Fetched,
    Failed,
    Cancelled,
}

struct Inner {
    proxies: Arc<dyn ProxySelector>,
    settings: EngineSettings,
    selectors: Selectors,
    /// One client per proxy key, built on first use
    clients: DashMap<String, Client>,
}

impl Inner {
    fn client_for(&self, proxy: &ProxyEndpoint) -> Result<Client, reqwest::Error> {
        if let Some(client) = self.clients.get(proxy.as_str()) {
            return Ok(client.clone());
        }

        let client = build_http_client(proxy, &self.settings.fetch)?;
        self.clients
            .insert(proxy.as_str().to_string(), client.clone());
        Ok(client)
    }
}

/// Crawl engine fetching pages over HTTP through the proxy pool
#[derive(Clone)]
pub struct HttpEngine {
    inner: Arc<Inner>,
}

impl HttpEngine {
    pub fn new(proxies: Arc<dyn ProxySelector>, settings: EngineSettings) -> Result<Self, EngineError> {
        Ok(Self {
            inner: Arc::new(Inner {
                proxies,
                settings,
                selectors: Selectors::site_default()?,
                clients: DashMap::new(),
            }),
        })
    }

    pub fn from_config(
        proxies: Arc<dyn ProxySelector>,
        config: &CrawlerConfig,
    ) -> Result<Self, EngineError> {
        Self::new(proxies, EngineSettings::from_config(config))
    }
}

impl CrawlEngine for HttpEngine {
    fn start(
        &self,
        seed: Url,
        filters: UrlFilters,
        handler: Arc<dyn PageHandler>,
        cancel: CancellationToken,
    ) -> Result<CrawlHandle, EngineError> {
        let (visitor, frontier) = Visitor::channel(filters);
        visitor.visit(seed.as_str())?;

        let inner = self.inner.clone();
        let task = tokio::spawn(drain(inner, frontier, visitor, handler, cancel));
        Ok(CrawlHandle::new(task))
    }
}

/// Runs workers until the frontier is empty and no worker is left
async fn drain(
    inner: Arc<Inner>,
    mut frontier: mpsc::UnboundedReceiver<Request>,
    visitor: Visitor,
    handler: Arc<dyn PageHandler>,
    cancel: CancellationToken,
) -> CrawlReport {
    let limit = inner.settings.concurrency;
    let mut workers = JoinSet::new();
    let mut report = CrawlReport::default();

    loop {
        while workers.len() < limit {
            match frontier.try_recv() {
                Ok(request) => {
                    report.requests += 1;
                    workers.spawn(process(
                        inner.clone(),
                        request,
                        handler.clone(),
                        visitor.clone(),
                        cancel.clone(),
                    ));
                }
                Err(_) => break,
            }
        }

        if workers.is_empty() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(in_flight = workers.len(), "Crawl cancelled, stopping workers");
                workers.abort_all();
                while workers.join_next().await.is_some() {}
                break;
            }
            Some(request) = frontier.recv(), if workers.len() < limit => {
                report.requests += 1;
                workers.spawn(process(
                    inner.clone(),
                    request,
                    handler.clone(),
                    visitor.clone(),
                    cancel.clone(),
                ));
            }
            joined = workers.join_next() => match joined {
                Some(Ok(WorkerOutcome::Failed)) => report.failures += 1,
                Some(Ok(_)) => {}
                Some(Err(e)) if e.is_panic() => {
                    report.panics += 1;
                    tracing::error!(
                        panic = %panic_message(e.into_panic()),
                        "Page worker panicked, continuing crawl"
                    );
                }
                Some(Err(_)) | None => {}
            }
        }
    }

    tracing::debug!(
        requests = report.requests,
        failures = report.failures,
        panics = report.panics,
        visited = visitor.visited_count(),
        "Frontier drained"
    );
    report
}

async fn process(
    inner: Arc<Inner>,
    mut request: Request,
    handler: Arc<dyn PageHandler>,
    visitor: Visitor,
    cancel: CancellationToken,
) -> WorkerOutcome {
    let pause = jittered_delay(inner.settings.delay, inner.settings.jitter);
    if !pause.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => return WorkerOutcome::Cancelled,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    let Some(proxy) = inner.proxies.select().await else {
        return WorkerOutcome::Cancelled;
    };
    request.proxy = Some(proxy.clone());

    let client = match inner.client_for(&proxy) {
        Ok(client) => client,
        Err(e) => {
            let failure = RequestFailure {
                request,
                status: None,
                message: format!("proxy client setup failed: {}", e),
            };
            handler.on_error(failure, &visitor).await;
            return WorkerOutcome::Failed;
        }
    };

    tracing::debug!(url = %request.url, proxy = %proxy, attempt = request.attempt, "Fetching");

    let (status, message) = match fetch_page(&client, request.url.as_str()).await {
        FetchResult::Success { final_url, body } => {
            let base = Url::parse(&final_url).unwrap_or_else(|_| request.url.clone());
            let elements = extract_elements(&body, &base, &inner.selectors);
            tracing::trace!(url = %request.url, elements = elements.len(), "Parsed page");

            for element in elements {
                handler.on_element(&request, element, &visitor).await;
            }
            return WorkerOutcome::Fetched;
        }
        FetchResult::HttpError {
            status_code,
            message,
        } => (Some(status_code), message),
        FetchResult::NetworkError { error } => (None, error),
    };

    handler
        .on_error(
            RequestFailure {
                request,
                status,
                message,
            },
            &visitor,
        )
        .await;
    WorkerOutcome::Failed
}

/// The request delay plus a random share of the jitter
fn jittered_delay(delay: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
}
