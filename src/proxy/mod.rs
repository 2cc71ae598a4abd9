//! Proxy pool module
//!
//! This module contains everything that decides which proxy a fetch goes
//! through:
//! - The endpoint and pool data model
//! - The pool manager, which serializes pool mutations through a command queue
//! - The recovery prober, which re-admits quarantined proxies that work again

mod endpoint;
mod manager;
mod pool;
mod prober;

pub use endpoint::{parse_endpoints, ProxyEndpoint};
pub use manager::{CommandLoop, PoolCommand, PoolStats, ProxyManager};
pub use pool::ProxyPool;
pub use prober::{ProbeFailure, RecoveryProber};
