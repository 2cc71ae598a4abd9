//! Day-by-day driver and service wiring
//!
//! The driver runs one session per calendar day, starting at the configured
//! day. Once it has caught up with today it sleeps and crawls today again,
//! picking up articles published since the previous pass.

use crate::config::{Config, ScheduleConfig};
use crate::crawler::{HttpEngine, Scraper, SessionSettings};
use crate::proxy::{CommandLoop, ProxyManager, RecoveryProber};
use crate::publish::{Broker, Publisher, RedisBroker};
use crate::url::DayKey;
use crate::UrlError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a run needs, built but not yet started
pub struct Services {
    pub scraper: Scraper,
    pub proxies: ProxyManager,
    pub command_loop: CommandLoop,
    pub prober: RecoveryProber,
}

impl Services {
    /// Builds the services and connects to Redis
    ///
    /// `cancel` stops the proxy manager's waiting selectors and command
    /// submissions.
    pub async fn connect(config: &Config, cancel: CancellationToken) -> crate::Result<Self> {
        let broker = RedisBroker::connect(&config.publish.redis_url).await?;
        Self::with_broker(config, Arc::new(broker), cancel)
    }

    /// Builds the services on top of an existing broker
    pub fn with_broker(
        config: &Config,
        broker: Arc<dyn Broker>,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let (proxies, command_loop) = ProxyManager::from_config(&config.proxy, cancel)?;
        let prober = RecoveryProber::from_config(proxies.clone(), &config.proxy)?;

        let engine = HttpEngine::from_config(Arc::new(proxies.clone()), &config.crawler)?;
        let publisher = Publisher::from_config(broker, &config.publish)?;
        let settings = SessionSettings::from_config(&config.crawler)?;
        let scraper = Scraper::new(Arc::new(engine), publisher, proxies.clone(), settings);

        Ok(Self {
            scraper,
            proxies,
            command_loop,
            prober,
        })
    }
}

/// The first day to crawl: the configured start date, or today
pub fn start_day(schedule: &ScheduleConfig) -> Result<DayKey, UrlError> {
    match &schedule.start_date {
        Some(raw) => DayKey::parse(raw),
        None => Ok(DayKey::today()),
    }
}

/// Runs sessions day after day until cancelled
///
/// A failed session is logged and the driver moves on as if it had
/// completed.
pub async fn run_schedule(
    scraper: &Scraper,
    start: DayKey,
    idle_sleep: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(start = %start, "Day driver started");
    let mut day = start;

    while !cancel.is_cancelled() {
        match scraper.scrape_day(day, &cancel).await {
            Ok(report) => tracing::info!(
                day = %day,
                published = report.signal.count,
                "Day finished"
            ),
            Err(e) => tracing::error!(day = %day, error = %e, "Session failed"),
        }

        if cancel.is_cancelled() {
            break;
        }

        if day >= DayKey::today() {
            tracing::info!(
                day = %day,
                sleep_secs = idle_sleep.as_secs(),
                "Caught up with today, sleeping before the next pass"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(idle_sleep) => {}
            }
        } else {
            day = day.succ();
        }
    }

    tracing::info!("Day driver stopped");
}
