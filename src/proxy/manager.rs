//! Proxy pool manager
//!
//! The manager is split in two halves:
//! - [`ProxyManager`], a cheap cloneable handle used by fetch workers to pick
//!   proxies and by anyone to submit pool commands
//! - [`CommandLoop`], the single consumer of the command queue and the only
//!   code path that mutates the pool
//!
//! Reads take a shared lock; mutations take the exclusive lock from the
//! command loop only, so a selector never observes a half-applied command.

use crate::config::ProxyConfig;
use crate::proxy::endpoint::parse_endpoints;
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::ConfigError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A request to change the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCommand {
    /// Re-admit a quarantined endpoint
    Add(ProxyEndpoint),

    /// Quarantine an active endpoint
    Delete(ProxyEndpoint),
}

impl fmt::Display for PoolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(p) => write!(f, "Add({})", p),
            Self::Delete(p) => write!(f, "Delete({})", p),
        }
    }
}

/// Counters of applied pool commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Add commands that moved an endpoint back to the active set
    pub readmitted: u64,

    /// Delete commands that moved an endpoint into quarantine
    pub quarantined: u64,

    /// Commands whose endpoint was not in the expected set
    pub ignored: u64,
}

struct Shared {
    pool: RwLock<ProxyPool>,
    cursor: AtomicUsize,
    /// `true` while the active set is non-empty
    ready: watch::Sender<bool>,
    stats: Mutex<PoolStats>,
}

impl Shared {
    fn apply(&self, command: &PoolCommand) -> bool {
        let mut pool = match self.pool.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let applied = match command {
            PoolCommand::Add(endpoint) => {
                tracing::info!(
                    proxy = %endpoint,
                    active = pool.active_len(),
                    quarantined = pool.quarantined_len(),
                    "Trying to re-admit proxy"
                );
                pool.readmit(endpoint)
            }
            PoolCommand::Delete(endpoint) => {
                tracing::info!(
                    proxy = %endpoint,
                    active = pool.active_len(),
                    quarantined = pool.quarantined_len(),
                    "Trying to quarantine proxy"
                );
                pool.quarantine(endpoint)
            }
        };

        {
            let mut stats = match self.stats.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match (command, applied) {
                (PoolCommand::Add(_), true) => stats.readmitted += 1,
                (PoolCommand::Delete(_), true) => stats.quarantined += 1,
                (_, false) => stats.ignored += 1,
            }
        }

        if applied {
            tracing::info!(
                command = %command,
                active = pool.active_len(),
                quarantined = pool.quarantined_len(),
                "Proxy pool updated"
            );
        } else {
            tracing::debug!(command = %command, "Proxy not in the expected set, ignoring");
        }

        // Waiters are only woken on the empty -> non-empty edge.
        let has_active = pool.has_active();
        self.ready.send_if_modified(|ready| {
            let became_ready = has_active && !*ready;
            *ready = has_active;
            became_ready
        });

        applied
    }

    fn read<T>(&self, f: impl FnOnce(&ProxyPool) -> T) -> T {
        match self.pool.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

/// Handle to the proxy pool
///
/// Cloning is cheap; every clone talks to the same pool and command queue.
#[derive(Clone)]
pub struct ProxyManager {
    shared: Arc<Shared>,
    commands: mpsc::Sender<PoolCommand>,
    cancel: CancellationToken,
}

/// The single consumer of pool commands
///
/// Must be driven with [`CommandLoop::run`] for submitted commands to take
/// effect.
pub struct CommandLoop {
    shared: Arc<Shared>,
    commands: mpsc::Receiver<PoolCommand>,
}

impl ProxyManager {
    /// Creates a manager with every endpoint active
    ///
    /// # Arguments
    ///
    /// * `endpoints` - Initial proxy list; must not be empty
    /// * `buffer` - Capacity of the command queue
    /// * `cancel` - Shutdown signal; blocked selectors give up when it fires
    ///
    /// # Returns
    ///
    /// * `Ok((ProxyManager, CommandLoop))` - The handle and its command consumer
    /// * `Err(ConfigError::EmptyProxyList)` - No endpoints were given
    pub fn new(
        endpoints: Vec<ProxyEndpoint>,
        buffer: usize,
        cancel: CancellationToken,
    ) -> Result<(Self, CommandLoop), ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyProxyList);
        }

        let pool = ProxyPool::new(endpoints);
        let (ready, _) = watch::channel(pool.has_active());
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let shared = Arc::new(Shared {
            pool: RwLock::new(pool),
            cursor: AtomicUsize::new(0),
            ready,
            stats: Mutex::new(PoolStats::default()),
        });

        let manager = Self {
            shared: shared.clone(),
            commands: tx,
            cancel,
        };
        let command_loop = CommandLoop {
            shared,
            commands: rx,
        };

        Ok((manager, command_loop))
    }

    /// Creates a manager from the `[proxy]` configuration section
    pub fn from_config(
        config: &ProxyConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, CommandLoop), ConfigError> {
        let endpoints = parse_endpoints(&config.endpoints)?;
        Self::new(endpoints, config.command_buffer, cancel)
    }

    /// Picks the next active proxy without waiting
    ///
    /// Returns `None` when the active set is empty.
    pub fn try_select(&self) -> Option<ProxyEndpoint> {
        self.shared.read(|pool| {
            if !pool.has_active() {
                return None;
            }
            let ticket = self.shared.cursor.fetch_add(1, Ordering::Relaxed);
            pool.pick(ticket).cloned()
        })
    }

    /// Picks the next active proxy in round-robin order
    ///
    /// When the active set is empty this waits until an endpoint is
    /// re-admitted. Every waiting caller is released on that transition.
    ///
    /// Returns `None` only when shutdown was requested while waiting.
    pub async fn select(&self) -> Option<ProxyEndpoint> {
        loop {
            if let Some(endpoint) = self.try_select() {
                return Some(endpoint);
            }

            tracing::info!("Waiting for a proxy to become available");
            let mut ready = self.shared.ready.subscribe();

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                changed = ready.wait_for(|ready| *ready) => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Enqueues a pool command
    ///
    /// Waits while the queue is full. The command is dropped (and logged)
    /// if the command loop has stopped or shutdown was requested.
    pub async fn submit(&self, command: PoolCommand) {
        let label = command.to_string();
        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!(command = %label, "Shutdown requested, dropping pool command");
            }
            sent = self.commands.send(command) => {
                if let Err(e) = sent {
                    tracing::warn!(command = %e.0, "Proxy manager stopped, dropping pool command");
                }
            }
        }
    }

    /// Snapshot of the active endpoints in selection order
    pub fn active(&self) -> Vec<ProxyEndpoint> {
        self.shared.read(|pool| pool.active().to_vec())
    }

    /// Snapshot of the quarantined endpoints
    pub fn quarantined(&self) -> Vec<ProxyEndpoint> {
        self.shared.read(|pool| pool.quarantined().to_vec())
    }

    pub fn stats(&self) -> PoolStats {
        match self.shared.stats.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl CommandLoop {
    /// Applies commands one at a time until shutdown or until every
    /// [`ProxyManager`] handle is dropped
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Proxy manager started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.shared.apply(&command);
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Proxy manager stopped");
    }
}
