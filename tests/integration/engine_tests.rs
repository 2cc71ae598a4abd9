//! Integration tests for the HTTP crawl engine
//!
//! A wiremock server plays both the news site and the proxy in front of it:
//! the engine sends proxy-style absolute-URI requests to it, and the mocks
//! answer by path.

use async_trait::async_trait;
use newsreel::crawler::{
    CrawlEngine, Element, EngineError, EngineSettings, FetchSettings, HttpEngine, PageHandler,
    ProxySelector, Request, RequestFailure, Visitor,
};
use newsreel::proxy::ProxyEndpoint;
use newsreel::url::{seed_url, DayKey, UrlFilters};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAY: &str = "20250305";

struct FixedProxy(ProxyEndpoint);

#[async_trait]
impl ProxySelector for FixedProxy {
    async fn select(&self) -> Option<ProxyEndpoint> {
        Some(self.0.clone())
    }
}

/// Selector for a pool that never recovers
struct EmptyPool;

#[async_trait]
impl ProxySelector for EmptyPool {
    async fn select(&self) -> Option<ProxyEndpoint> {
        std::future::pending().await
    }
}

/// Follows links, retries failures once, records everything
#[derive(Default)]
struct RecordingHandler {
    elements: Mutex<Vec<(String, Element)>>,
    failures: Mutex<Vec<RequestFailure>>,
    panic_on_title: bool,
}

#[async_trait]
impl PageHandler for RecordingHandler {
    async fn on_element(&self, request: &Request, element: Element, visitor: &Visitor) {
        if let Element::Link { href } = &element {
            let _ = visitor.visit(href);
        }
        if self.panic_on_title && matches!(element, Element::Title { .. }) {
            panic!("handler failure");
        }
        self.elements
            .lock()
            .unwrap()
            .push((request.url.to_string(), element));
    }

    async fn on_error(&self, failure: RequestFailure, visitor: &Visitor) {
        if failure.request.attempt == 0 {
            let _ = visitor.retry(&failure.request);
        }
        self.failures.lock().unwrap().push(failure);
    }
}

impl RecordingHandler {
    fn fetched_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .elements
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls.dedup();
        urls
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        concurrency: 2,
        delay: Duration::ZERO,
        jitter: Duration::from_millis(5),
        fetch: FetchSettings {
            user_agent: "newsreel-test/1.0".to_string(),
            timeout: Duration::from_secs(5),
        },
    }
}

struct Site {
    server: MockServer,
    root: Url,
    proxy: ProxyEndpoint,
}

async fn site() -> Site {
    let server = MockServer::start().await;
    let root = Url::parse(&server.uri()).unwrap();
    let proxy = ProxyEndpoint::parse(&server.uri()).unwrap();
    Site {
        server,
        root,
        proxy,
    }
}

async fn mount_page(server: &MockServer, page: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

fn day() -> DayKey {
    DayKey::parse(DAY).unwrap()
}

#[tokio::test]
async fn test_crawl_follows_same_day_links() {
    let site = site().await;
    mount_page(
        &site.server,
        "/20250305/",
        r#"<html><body>
            <a href="/20250305/moskva-1.html">Today</a>
            <a href="/20250304/old-2.html">Yesterday</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        &site.server,
        "/20250305/moskva-1.html",
        r#"<html><body>
            <div class="article__info-date">15:04 05.03.2025</div>
            <h1 class="article__title">Headline</h1>
            <div class="article__text">Body</div>
            <div class="recommend__place"></div>
        </body></html>"#,
    )
    .await;

    let engine = HttpEngine::new(Arc::new(FixedProxy(site.proxy.clone())), settings()).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let seed = seed_url(&site.root, day()).unwrap();

    let report = engine
        .start(seed.clone(), filters, handler.clone(), CancellationToken::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.requests, 2);
    assert_eq!(report.failures, 0);

    let article = site.root.join("/20250305/moskva-1.html").unwrap().to_string();
    assert_eq!(handler.fetched_urls(), vec![seed.to_string(), article.clone()]);

    let article_elements: Vec<Element> = handler
        .elements
        .lock()
        .unwrap()
        .iter()
        .filter(|(url, _)| url == &article)
        .map(|(_, e)| e.clone())
        .collect();
    assert_eq!(
        article_elements,
        vec![
            Element::Date {
                text: "15:04 05.03.2025".to_string()
            },
            Element::Title {
                text: "Headline".to_string()
            },
            Element::Body {
                text: "Body".to_string()
            },
            Element::Recommendation,
        ]
    );
}

#[tokio::test]
async fn test_http_errors_reach_the_error_callback_and_can_be_retried() {
    let site = site().await;
    Mock::given(method("GET"))
        .and(path("/20250305/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&site.server)
        .await;
    mount_page(&site.server, "/20250305/", "<html><body></body></html>").await;

    let engine = HttpEngine::new(Arc::new(FixedProxy(site.proxy.clone())), settings()).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let seed = seed_url(&site.root, day()).unwrap();

    let report = engine
        .start(seed.clone(), filters, handler.clone(), CancellationToken::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.requests, 2);
    assert_eq!(report.failures, 1);

    let failures = handler.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status, Some(429));
    assert_eq!(failures[0].message, "429 Too Many Requests");
    assert_eq!(failures[0].request.url, seed);
    assert_eq!(failures[0].request.proxy, Some(site.proxy.clone()));
}

#[tokio::test]
async fn test_gateway_status_keeps_reason_phrase() {
    let site = site().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&site.server)
        .await;

    let engine = HttpEngine::new(Arc::new(FixedProxy(site.proxy.clone())), settings()).unwrap();
    let handler = Arc::new(RecordingHandler::default());
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let seed = seed_url(&site.root, day()).unwrap();

    engine
        .start(seed, filters, handler.clone(), CancellationToken::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    let failures = handler.failures.lock().unwrap();
    // First attempt plus the handler's single retry
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.message == "502 Bad Gateway"));
    assert_eq!(failures[1].request.attempt, 1);
}

#[tokio::test]
async fn test_seed_outside_filters_is_rejected() {
    let site = site().await;
    let engine = HttpEngine::new(Arc::new(FixedProxy(site.proxy.clone())), settings()).unwrap();
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let other_day = seed_url(&site.root, DayKey::parse("20250304").unwrap()).unwrap();

    let result = engine.start(
        other_day,
        filters,
        Arc::new(RecordingHandler::default()),
        CancellationToken::new(),
    );
    assert!(matches!(result, Err(EngineError::Seed(_))));
}

#[tokio::test]
async fn test_handler_panic_does_not_stop_the_crawl() {
    let site = site().await;
    mount_page(
        &site.server,
        "/20250305/",
        r#"<html><body>
            <a href="/20250305/a-1.html">A</a>
            <div class="article__title">Listing title</div>
        </body></html>"#,
    )
    .await;
    mount_page(
        &site.server,
        "/20250305/a-1.html",
        r#"<div class="article__text">Body</div>"#,
    )
    .await;

    let engine = HttpEngine::new(Arc::new(FixedProxy(site.proxy.clone())), settings()).unwrap();
    let handler = Arc::new(RecordingHandler {
        panic_on_title: true,
        ..Default::default()
    });
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let seed = seed_url(&site.root, day()).unwrap();

    let report = engine
        .start(seed, filters, handler.clone(), CancellationToken::new())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.panics, 1);
    assert_eq!(report.requests, 2);
    assert!(handler
        .elements
        .lock()
        .unwrap()
        .iter()
        .any(|(_, e)| e == &Element::Body {
            text: "Body".to_string()
        }));
}

#[tokio::test]
async fn test_cancel_releases_workers_waiting_for_a_proxy() {
    let site = site().await;
    let engine = HttpEngine::new(Arc::new(EmptyPool), settings()).unwrap();
    let filters = UrlFilters::for_day(&site.root, day()).unwrap();
    let seed = seed_url(&site.root, day()).unwrap();
    let cancel = CancellationToken::new();

    let handle = engine
        .start(seed, filters, Arc::new(RecordingHandler::default()), cancel.clone())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("crawl did not stop after cancellation")
        .unwrap();
    assert_eq!(report.requests, 1);
}
