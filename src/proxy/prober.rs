//! Recovery prober for quarantined proxies
//!
//! On every tick the prober snapshots the quarantined set and fetches a
//! known-good URL through each endpoint. Endpoints that answer with a 2xx
//! status are handed back to the manager as `Add` commands; everything else
//! stays quarantined until the next tick.

use crate::config::ProxyConfig;
use crate::proxy::{PoolCommand, ProxyEndpoint, ProxyManager};
use crate::ConfigError;
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a quarantined proxy failed its probe
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("failed to build probe client: {0}")]
    Client(reqwest::Error),

    #[error("probe request failed: {0}")]
    Transport(reqwest::Error),

    #[error("probe returned HTTP {0}")]
    Status(u16),

    #[error("probe cancelled")]
    Cancelled,
}

/// Background loop re-testing quarantined proxies
pub struct RecoveryProber {
    manager: ProxyManager,
    probe_url: Url,
    interval: Duration,
    timeout: Duration,
}

impl RecoveryProber {
    pub fn new(manager: ProxyManager, probe_url: Url, interval: Duration, timeout: Duration) -> Self {
        Self {
            manager,
            probe_url,
            interval,
            timeout,
        }
    }

    /// Creates a prober from the `[proxy]` configuration section
    pub fn from_config(manager: ProxyManager, config: &ProxyConfig) -> Result<Self, ConfigError> {
        let probe_url = Url::parse(&config.probe_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid probe-url '{}': {}", config.probe_url, e))
        })?;

        Ok(Self::new(
            manager,
            probe_url,
            config.recover_interval(),
            config.probe_timeout(),
        ))
    }

    /// Probes on a fixed interval until shutdown
    ///
    /// The first probe happens one interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            probe_url = %self.probe_url,
            "Recovery prober started"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.probe_quarantined(&cancel).await;
                }
            }
        }

        tracing::info!("Recovery prober stopped");
    }

    /// Probes every currently quarantined proxy once
    ///
    /// Returns the number of proxies submitted for re-admission.
    pub async fn probe_quarantined(&self, cancel: &CancellationToken) -> usize {
        let quarantined = self.manager.quarantined();
        if quarantined.is_empty() {
            return 0;
        }

        tracing::debug!(count = quarantined.len(), "Probing quarantined proxies");

        let mut recovered = 0;
        for endpoint in quarantined {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(ProbeFailure::Cancelled),
                outcome = self.probe(&endpoint) => outcome,
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(proxy = %endpoint, "Proxy recovered");
                    self.manager.submit(PoolCommand::Add(endpoint)).await;
                    recovered += 1;
                }
                Err(ProbeFailure::Cancelled) => break,
                Err(e) => {
                    tracing::info!(proxy = %endpoint, error = %e, "Proxy still unavailable");
                }
            }
        }

        recovered
    }

    /// Fetches the probe URL through a single proxy
    pub async fn probe(&self, endpoint: &ProxyEndpoint) -> Result<(), ProbeFailure> {
        let proxy = Proxy::all(endpoint.url().as_str()).map_err(ProbeFailure::Client)?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()
            .map_err(ProbeFailure::Client)?;

        let response = client
            .get(self.probe_url.clone())
            .send()
            .await
            .map_err(ProbeFailure::Transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeFailure::Status(status.as_u16()))
        }
    }
}
