//! Newsreel main entry point
//!
//! This is the command-line interface for the Newsreel day-by-day news crawler.

use anyhow::Context;
use clap::Parser;
use newsreel::config::{load_config_with_hash, Config};
use newsreel::crawler::{run_day, start_day};
use newsreel::url::{seed_url, UrlFilters};
use newsreel::DayKey;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Newsreel: a day-by-day news crawler
///
/// Newsreel crawls a news site one calendar day at a time through a pool of
/// rotating proxies and publishes every article it finds to partitioned
/// Redis channels.
#[derive(Parser, Debug)]
#[command(name = "newsreel")]
#[command(version)]
#[command(about = "A day-by-day news crawler behind rotating proxies", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl a single day (YYYYMMDD) and exit
    #[arg(long, value_name = "YYYYMMDD")]
    day: Option<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "day")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(watch_shutdown(cancel.clone()));

    match cli.day {
        Some(raw) => {
            let day = DayKey::parse(&raw).context("Invalid --day")?;
            let report = run_day(config, day, cancel).await?;
            tracing::info!(
                day = %report.signal.day,
                published = report.signal.count,
                incomplete = report.stats.incomplete,
                "Single-day crawl finished"
            );
        }
        None => newsreel::run(config, cancel).await?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("newsreel=info,warn"),
            1 => EnvFilter::new("newsreel=debug,info"),
            2 => EnvFilter::new("newsreel=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels `cancel` on Ctrl-C or SIGTERM
async fn watch_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown requested");
    cancel.cancel();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Newsreel Dry Run ===\n");

    println!("Proxies ({}):", config.proxy.endpoints.len());
    for endpoint in &config.proxy.endpoints {
        println!("  - {}", endpoint);
    }
    println!("  Recover interval: {}s", config.proxy.recover_interval);
    println!("  Probe URL: {}", config.proxy.probe_url);

    println!("\nCrawler:");
    println!("  Site root: {}", config.crawler.site_root);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!(
        "  Request delay: {}ms (+ up to {}ms jitter)",
        config.crawler.request_delay, config.crawler.request_jitter
    );
    println!("  User agent: {}", config.crawler.user_agent);

    println!("\nPublishing:");
    println!("  Redis: {}", config.publish.redis_url);
    println!(
        "  Channels: {}:0..{}, {}_day_done",
        config.publish.channel,
        config.publish.partitions.saturating_sub(1),
        config.publish.channel
    );

    let day = start_day(&config.schedule)?;
    let root = Url::parse(&config.crawler.site_root)?;
    let filters = UrlFilters::for_day(&root, day)?;

    println!("\nFirst session ({}):", day.human());
    println!("  Seed: {}", seed_url(&root, day)?);
    for pattern in filters.patterns() {
        println!("  Filter: {}", pattern);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
