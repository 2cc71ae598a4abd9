//! Integration tests for the proxy pool
//!
//! These tests run the manager's command loop on the runtime and use
//! wiremock servers as stand-in HTTP proxies for the recovery prober.

use newsreel::proxy::{PoolCommand, ProxyEndpoint, ProxyManager, RecoveryProber};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Probe target; requests never leave the mock proxy
const PROBE_URL: &str = "http://probe.invalid/";

async fn mock_proxy(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn endpoints(n: usize) -> Vec<ProxyEndpoint> {
    (1..=n)
        .map(|i| ProxyEndpoint::parse(&format!("10.0.0.{}:3128", i)).unwrap())
        .collect()
}

#[tokio::test]
async fn test_concurrent_selection_stays_balanced() {
    let cancel = CancellationToken::new();
    let (manager, command_loop) = ProxyManager::new(endpoints(3), 10, cancel.clone()).unwrap();
    tokio::spawn(command_loop.run(cancel.clone()));

    let mut tasks = Vec::new();
    for _ in 0..30 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move { manager.select().await.unwrap() }));
    }

    let mut counts = std::collections::HashMap::new();
    for task in tasks {
        *counts.entry(task.await.unwrap()).or_insert(0) += 1;
    }

    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|&c| c == 10));
    cancel.cancel();
}

#[tokio::test]
async fn test_emptied_pool_releases_every_waiter_on_readmission() {
    let cancel = CancellationToken::new();
    let only = endpoints(1).remove(0);
    let (manager, command_loop) = ProxyManager::new(vec![only.clone()], 10, cancel.clone()).unwrap();
    tokio::spawn(command_loop.run(cancel.clone()));

    manager.submit(PoolCommand::Delete(only.clone())).await;
    wait_until(|| manager.active().is_empty()).await;

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.select().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(waiters.iter().all(|w| !w.is_finished()));

    manager.submit(PoolCommand::Add(only.clone())).await;

    for waiter in waiters {
        let selected = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter was not released")
            .unwrap();
        assert_eq!(selected, Some(only.clone()));
    }
    cancel.cancel();
}

#[tokio::test]
async fn test_prober_readmits_only_working_proxies() {
    let good = mock_proxy(200).await;
    let bad = mock_proxy(502).await;
    let good_proxy = ProxyEndpoint::parse(&good.uri()).unwrap();
    let bad_proxy = ProxyEndpoint::parse(&bad.uri()).unwrap();

    let cancel = CancellationToken::new();
    let (manager, command_loop) = ProxyManager::new(
        vec![good_proxy.clone(), bad_proxy.clone()],
        10,
        cancel.clone(),
    )
    .unwrap();
    tokio::spawn(command_loop.run(cancel.clone()));

    manager.submit(PoolCommand::Delete(good_proxy.clone())).await;
    manager.submit(PoolCommand::Delete(bad_proxy.clone())).await;
    wait_until(|| manager.quarantined().len() == 2).await;

    let prober = RecoveryProber::new(
        manager.clone(),
        Url::parse(PROBE_URL).unwrap(),
        Duration::from_secs(300),
        Duration::from_secs(5),
    );

    assert_eq!(prober.probe_quarantined(&cancel).await, 1);
    wait_until(|| manager.active().len() == 1).await;

    assert_eq!(manager.active(), vec![good_proxy]);
    assert_eq!(manager.quarantined(), vec![bad_proxy]);
    assert_eq!(manager.stats().readmitted, 1);
    cancel.cancel();
}

#[tokio::test]
async fn test_probe_reports_status_and_transport_failures() {
    let bad = mock_proxy(503).await;
    let (manager, _loop) =
        ProxyManager::new(endpoints(1), 10, CancellationToken::new()).unwrap();
    let prober = RecoveryProber::new(
        manager,
        Url::parse(PROBE_URL).unwrap(),
        Duration::from_secs(300),
        Duration::from_secs(2),
    );

    let status = prober
        .probe(&ProxyEndpoint::parse(&bad.uri()).unwrap())
        .await
        .unwrap_err();
    assert_eq!(status.to_string(), "probe returned HTTP 503");

    // Nothing listens on port 9 of localhost
    let unreachable = ProxyEndpoint::parse("127.0.0.1:9").unwrap();
    assert!(prober.probe(&unreachable).await.is_err());
}

#[tokio::test]
async fn test_prober_loop_runs_on_interval_and_stops_on_cancel() {
    let good = mock_proxy(200).await;
    let good_proxy = ProxyEndpoint::parse(&good.uri()).unwrap();
    let spare = endpoints(1).remove(0);

    let cancel = CancellationToken::new();
    let (manager, command_loop) =
        ProxyManager::new(vec![good_proxy.clone(), spare], 10, cancel.clone()).unwrap();
    let manager_task = tokio::spawn(command_loop.run(cancel.clone()));

    manager.submit(PoolCommand::Delete(good_proxy.clone())).await;
    wait_until(|| manager.quarantined().len() == 1).await;

    let prober = RecoveryProber::new(
        manager.clone(),
        Url::parse(PROBE_URL).unwrap(),
        Duration::from_millis(100),
        Duration::from_secs(2),
    );
    let prober_task = tokio::spawn(prober.run(cancel.clone()));

    wait_until(|| manager.quarantined().is_empty()).await;
    let active: HashSet<_> = manager.active().into_iter().collect();
    assert!(active.contains(&good_proxy));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), async {
        manager_task.await.unwrap();
        prober_task.await.unwrap();
    })
    .await
    .expect("background loops did not stop");
}
