//! Crawler module
//!
//! This module contains the crawling side of Newsreel:
//! - The crawl engine interface and its HTTP implementation
//! - HTML element extraction and article date parsing
//! - The per-day session orchestrator
//! - The day-by-day driver and top-level run loop

mod driver;
mod engine;
mod fetcher;
mod http_engine;
mod parser;
mod session;

pub use driver::{run_schedule, start_day, Services};
pub use engine::{
    panic_message, CrawlEngine, CrawlHandle, CrawlReport, Element, EngineError, PageHandler,
    ProxySelector, Request, RequestFailure, VisitError, Visitor,
};
pub use fetcher::{build_http_client, fetch_page, status_line, FetchResult, FetchSettings};
pub use http_engine::{EngineSettings, HttpEngine};
pub use parser::{extract_elements, parse_article_date, DateError, Selectors};
pub use session::{
    classify_failure, FailureClass, Scraper, SessionReport, SessionSettings, SessionStats,
};

use crate::config::Config;
use crate::url::DayKey;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Runs the crawler until cancelled
///
/// This is the main entry point. It will:
/// 1. Connect to the broker and build the proxy manager, prober and engine
/// 2. Spawn the proxy manager, the recovery prober and the day driver
/// 3. Wait for all three to exit after `cancel` fires
///
/// # Returns
///
/// * `Ok(())` - Clean shutdown
/// * `Err(NewsreelError)` - Startup failed (bad config, broker unreachable)
pub async fn run(config: Config, cancel: CancellationToken) -> crate::Result<()> {
    let start = start_day(&config.schedule)?;
    let Services {
        scraper,
        command_loop,
        prober,
        ..
    } = Services::connect(&config, cancel.clone()).await?;

    let manager_task = tokio::spawn(command_loop.run(cancel.clone()));
    let prober_task = tokio::spawn(prober.run(cancel.clone()));
    let idle_sleep = config.schedule.idle_sleep();
    let driver_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { run_schedule(&scraper, start, idle_sleep, cancel).await })
    };

    let (manager, prober, driver) = tokio::join!(manager_task, prober_task, driver_task);
    log_task_failures([
        ("proxy manager", manager),
        ("recovery prober", prober),
        ("day driver", driver),
    ]);

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Crawls a single day, then shuts the background loops down
pub async fn run_day(
    config: Config,
    day: DayKey,
    cancel: CancellationToken,
) -> crate::Result<SessionReport> {
    let background = cancel.child_token();
    let Services {
        scraper,
        command_loop,
        prober,
        ..
    } = Services::connect(&config, background.clone()).await?;

    let manager_task = tokio::spawn(command_loop.run(background.clone()));
    let prober_task = tokio::spawn(prober.run(background.clone()));

    let report = scraper.scrape_day(day, &cancel).await;

    background.cancel();
    let (manager, prober) = tokio::join!(manager_task, prober_task);
    log_task_failures([("proxy manager", manager), ("recovery prober", prober)]);
    tracing::info!("Shutdown complete");

    Ok(report?)
}

fn log_task_failures<const N: usize>(results: [(&str, Result<(), JoinError>); N]) {
    for (task, result) in results {
        if let Err(e) = result {
            tracing::error!(task, error = %e, "Task ended abnormally");
        }
    }
}
