//! Integration tests for crawl sessions
//!
//! These tests drive the session orchestrator with a scripted engine that
//! replays element and failure callbacks, and a broker that records what it
//! is asked to publish.

use async_trait::async_trait;
use newsreel::crawler::{
    CrawlEngine, CrawlHandle, CrawlReport, Element, EngineError, PageHandler, Request,
    RequestFailure, Scraper, SessionSettings, Visitor,
};
use newsreel::proxy::{CommandLoop, ProxyEndpoint, ProxyManager};
use newsreel::publish::{partition_for, ArticleRecord, Broker, BrokerError, CompletionSignal, Publisher};
use newsreel::url::{DayKey, UrlFilters};
use newsreel::SessionError;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

const DAY: &str = "20250305";
const PAGE_A: &str = "https://ria.ru/20250305/moskva-2003456789.html";
const PAGE_B: &str = "https://ria.ru/20250305/economy-2003456790.html";
const LISTING: &str = "https://ria.ru/20250305/";
const BACKOFF: Duration = Duration::from_millis(50);

/// One replayed engine event
#[derive(Clone)]
enum Step {
    Page {
        url: &'static str,
        elements: Vec<Element>,
    },
    Fail {
        url: &'static str,
        status: Option<u16>,
        message: &'static str,
        attempt: u32,
    },
    Panic,
}

/// Engine replaying a fixed script through one proxy
struct ScriptedEngine {
    steps: Vec<Step>,
    proxy: ProxyEndpoint,
    /// Requests the session queued that the script did not consume
    queued: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedEngine {
    fn new(steps: Vec<Step>, proxy: ProxyEndpoint) -> Self {
        Self {
            steps,
            proxy,
            queued: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CrawlEngine for ScriptedEngine {
    fn start(
        &self,
        seed: Url,
        filters: UrlFilters,
        handler: Arc<dyn PageHandler>,
        _cancel: CancellationToken,
    ) -> Result<CrawlHandle, EngineError> {
        let (visitor, mut frontier) = Visitor::channel(filters);
        visitor.visit(seed.as_str())?;
        // The seed itself is not replayed
        let _ = frontier.try_recv();

        let steps = self.steps.clone();
        let proxy = self.proxy.clone();
        let queued = self.queued.clone();

        Ok(CrawlHandle::new(tokio::spawn(async move {
            let mut report = CrawlReport::default();

            for step in steps {
                report.requests += 1;
                match step {
                    Step::Page { url, elements } => {
                        let request = request(url, &proxy, 0);
                        for element in elements {
                            handler.on_element(&request, element, &visitor).await;
                        }
                    }
                    Step::Fail {
                        url,
                        status,
                        message,
                        attempt,
                    } => {
                        report.failures += 1;
                        let failure = RequestFailure {
                            request: request(url, &proxy, attempt),
                            status,
                            message: message.to_string(),
                        };
                        handler.on_error(failure, &visitor).await;
                    }
                    Step::Panic => panic!("scripted callback failure"),
                }
            }

            while let Ok(request) = frontier.try_recv() {
                queued.lock().unwrap().push(request);
            }
            report
        })))
    }
}

fn request(url: &str, proxy: &ProxyEndpoint, attempt: u32) -> Request {
    Request {
        url: Url::parse(url).unwrap(),
        proxy: Some(proxy.clone()),
        attempt,
    }
}

#[derive(Default)]
struct RecordingBroker {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    /// Refuse article messages; the completion signal still goes through
    reject_articles: bool,
}

impl RecordingBroker {
    fn channels(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    fn completion(&self) -> Option<CompletionSignal> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c == "scrapper_day_done")
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.reject_articles && channel != "scrapper_day_done" {
            return Err(BrokerError::Unavailable("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push((channel.to_string(), payload));
        Ok(())
    }
}

struct Harness {
    scraper: Scraper,
    broker: Arc<RecordingBroker>,
    manager: ProxyManager,
    queued: Arc<Mutex<Vec<Request>>>,
    proxy: ProxyEndpoint,
    cancel: CancellationToken,
}

fn harness(steps: Vec<Step>) -> Harness {
    harness_with_broker(steps, RecordingBroker::default())
}

fn harness_with_broker(steps: Vec<Step>, broker: RecordingBroker) -> Harness {
    let proxy = ProxyEndpoint::parse("10.0.0.1:3128").unwrap();
    let spare = ProxyEndpoint::parse("10.0.0.2:3128").unwrap();
    let cancel = CancellationToken::new();

    let (manager, command_loop): (ProxyManager, CommandLoop) =
        ProxyManager::new(vec![proxy.clone(), spare], 10, cancel.clone()).unwrap();
    tokio::spawn(command_loop.run(cancel.clone()));

    let broker = Arc::new(broker);
    let publisher = Publisher::new(broker.clone(), "scrapper", 5).unwrap();

    let engine = ScriptedEngine::new(steps, proxy.clone());
    let queued = engine.queued.clone();

    let settings = SessionSettings {
        site_root: Url::parse("https://ria.ru").unwrap(),
        rate_limit_backoff: BACKOFF,
        max_rate_limit_retries: 3,
    };
    let scraper = Scraper::new(Arc::new(engine), publisher, manager.clone(), settings);

    Harness {
        scraper,
        broker,
        manager,
        queued,
        proxy,
        cancel,
    }
}

fn day() -> DayKey {
    DayKey::parse(DAY).unwrap()
}

fn complete_article() -> Vec<Element> {
    vec![
        Element::Title {
            text: "Title".to_string(),
        },
        Element::Body {
            text: "Body A".to_string(),
        },
        Element::Body {
            text: "Body B".to_string(),
        },
        Element::Date {
            text: "15:04 05.03.2025".to_string(),
        },
        Element::Recommendation,
    ]
}

#[tokio::test]
async fn test_complete_and_incomplete_articles() {
    let h = harness(vec![
        Step::Page {
            url: PAGE_A,
            elements: complete_article(),
        },
        Step::Page {
            url: PAGE_B,
            elements: vec![
                Element::Title {
                    text: "Only a title".to_string(),
                },
                Element::Recommendation,
            ],
        },
    ]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    assert_eq!(report.stats.published, 1);
    assert_eq!(report.stats.incomplete, 1);
    assert_eq!(report.stats.publish_failures, 0);
    assert_eq!(report.stats.unpublished, 1);
    assert_eq!(report.signal.count, 1);
    assert_eq!(report.signal.day, DAY);

    let sent = h.broker.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2, "one article and one completion signal");

    let (channel, payload) = &sent[0];
    assert_eq!(channel, &format!("scrapper:{}", partition_for(PAGE_A, 5)));
    let record: ArticleRecord = serde_json::from_slice(payload).unwrap();
    assert_eq!(record.url, PAGE_A);
    assert_eq!(record.date, "2025-03-05T15:04:00Z");
    assert_eq!(record.text, "Title Body A Body B");

    let done = h.broker.completion().unwrap();
    assert_eq!(done.count, 1);
    assert_eq!(done.day, DAY);
}

#[tokio::test]
async fn test_broker_outage_loses_articles_but_completes() {
    let h = harness_with_broker(
        vec![
            Step::Page {
                url: PAGE_A,
                elements: complete_article(),
            },
            Step::Page {
                url: PAGE_B,
                elements: complete_article(),
            },
        ],
        RecordingBroker {
            reject_articles: true,
            ..Default::default()
        },
    );

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    assert_eq!(report.stats.published, 0);
    assert_eq!(report.stats.publish_failures, 2);
    assert_eq!(report.stats.incomplete, 0);
    assert_eq!(report.signal.count, 0);
    // Failed articles stay pending until the session discards them
    assert_eq!(report.stats.unpublished, 2);
    assert_eq!(h.broker.channels(), vec!["scrapper_day_done".to_string()]);
    assert_eq!(h.broker.completion().unwrap().count, 0);
}

#[tokio::test]
async fn test_published_article_is_not_published_twice() {
    let mut elements = complete_article();
    elements.push(Element::Recommendation);
    let h = harness(vec![Step::Page {
        url: PAGE_A,
        elements,
    }]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    assert_eq!(report.stats.published, 1);
    assert_eq!(report.stats.unpublished, 0);
    assert_eq!(report.signal.count, 1);

    let article_channel = format!("scrapper:{}", partition_for(PAGE_A, 5));
    let articles = h
        .broker
        .channels()
        .into_iter()
        .filter(|c| c == &article_channel)
        .count();
    assert_eq!(articles, 1);
}

#[tokio::test]
async fn test_malformed_date_skips_article() {
    let h = harness(vec![Step::Page {
        url: PAGE_A,
        elements: vec![
            Element::Title {
                text: "Title".to_string(),
            },
            Element::Date {
                text: "вчера вечером".to_string(),
            },
            Element::Recommendation,
        ],
    }]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    assert_eq!(report.stats.incomplete, 1);
    assert_eq!(report.signal.count, 0);
    assert_eq!(h.broker.channels(), vec!["scrapper_day_done".to_string()]);
}

#[tokio::test]
async fn test_article_split_across_callbacks_keeps_arrival_order() {
    let mut first = complete_article();
    let marker = first.pop().unwrap();
    let h = harness(vec![
        Step::Page {
            url: PAGE_A,
            elements: first,
        },
        Step::Page {
            url: PAGE_B,
            elements: vec![Element::Body {
                text: "Other page".to_string(),
            }],
        },
        Step::Page {
            url: PAGE_A,
            elements: vec![
                Element::Body {
                    text: "Body C".to_string(),
                },
                marker,
            ],
        },
    ]);

    h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    let sent = h.broker.sent.lock().unwrap().clone();
    let record: ArticleRecord = serde_json::from_slice(&sent[0].1).unwrap();
    assert_eq!(record.text, "Title Body A Body B Body C");
}

#[tokio::test]
async fn test_gateway_error_quarantines_proxy_without_retry() {
    let h = harness(vec![Step::Fail {
        url: PAGE_A,
        status: Some(502),
        message: "502 Bad Gateway",
        attempt: 0,
    }]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();
    assert_eq!(report.stats.proxy_failures, 1);
    assert_eq!(report.stats.retries, 0);
    assert!(h.queued.lock().unwrap().is_empty());

    // The command loop applies the Delete asynchronously
    let deadline = Instant::now() + Duration::from_secs(2);
    while h.manager.quarantined().is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.manager.quarantined(), vec![h.proxy.clone()]);
    assert!(!h.manager.active().contains(&h.proxy));
    assert_eq!(h.manager.stats().quarantined, 1);
}

#[tokio::test]
async fn test_rate_limit_retries_once_after_backoff() {
    let h = harness(vec![Step::Fail {
        url: PAGE_A,
        status: Some(429),
        message: "429 Too Many Requests",
        attempt: 0,
    }]);

    let started = Instant::now();
    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();
    assert!(started.elapsed() >= BACKOFF);
    assert_eq!(report.stats.retries, 1);

    let queued = h.queued.lock().unwrap().clone();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].url.as_str(), PAGE_A);
    assert_eq!(queued[0].attempt, 1);

    assert!(h.manager.quarantined().is_empty());
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_max_retries() {
    let h = harness(vec![Step::Fail {
        url: PAGE_A,
        status: Some(429),
        message: "429 Too Many Requests",
        attempt: 3,
    }]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();
    assert_eq!(report.stats.retries, 0);
    assert!(h.queued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_other_errors_are_abandoned() {
    let h = harness(vec![Step::Fail {
        url: PAGE_A,
        status: Some(404),
        message: "404 Not Found",
        attempt: 0,
    }]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.stats.proxy_failures, 0);
    assert!(h.queued.lock().unwrap().is_empty());
    assert!(h.manager.quarantined().is_empty());
}

#[tokio::test]
async fn test_links_and_pagination_are_followed_within_the_day() {
    let h = harness(vec![Step::Page {
        url: LISTING,
        elements: vec![
            Element::Link {
                href: PAGE_A.to_string(),
            },
            Element::Link {
                href: "https://ria.ru/20250304/yesterday-1.html".to_string(),
            },
            Element::Link {
                href: "https://ria.ru/20250305/a.html?utm=feed".to_string(),
            },
            Element::Link {
                href: PAGE_A.to_string(),
            },
            Element::LoadMore {
                data_url: "/services/20250305/more.html?id=2003456789".to_string(),
            },
        ],
    }]);

    h.scraper.scrape_day(day(), &h.cancel).await.unwrap();

    let queued: Vec<String> = h
        .queued
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.url.to_string())
        .collect();
    assert_eq!(
        queued,
        vec![
            PAGE_A.to_string(),
            "https://ria.ru/services/20250305/more.html?id=2003456789".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_panic_inside_crawl_still_completes_session() {
    let h = harness(vec![
        Step::Page {
            url: PAGE_A,
            elements: complete_article(),
        },
        Step::Panic,
    ]);

    let report = h.scraper.scrape_day(day(), &h.cancel).await.unwrap();
    assert_eq!(report.stats.panics, 1);
    assert_eq!(report.signal.count, 1);
    assert_eq!(h.broker.completion().unwrap().count, 1);
}

#[tokio::test]
async fn test_future_day_is_rejected() {
    let h = harness(vec![]);
    let tomorrow = DayKey::today().succ();

    let err = h.scraper.scrape_day(tomorrow, &h.cancel).await.unwrap_err();
    assert!(matches!(err, SessionError::FutureDay { .. }));
    assert!(h.broker.channels().is_empty());
}

#[tokio::test]
async fn test_today_is_allowed() {
    let h = harness(vec![]);
    let report = h.scraper.scrape_day(DayKey::today(), &h.cancel).await.unwrap();
    assert_eq!(report.signal.count, 0);
    assert_eq!(report.signal.day, DayKey::today().to_string());
}
