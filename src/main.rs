use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use x_watchbot::config;
use x_watchbot::scheduler::Scheduler;
use x_watchbot::service::WatchService;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run scheduled watchlist fetches and translations until interrupted"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let service = Arc::new(WatchService::from_config(&cfg).await?);
    let scheduler = Scheduler::new(service);
    scheduler.sync_from_store().await?;
    info!(scopes = ?scheduler.active_scopes().await, "scheduler started");

    // Settings written by watchlist_ctl are picked up on the next refresh.
    let mut refresh = tokio::time::interval(Duration::from_secs(cfg.app.settings_refresh_secs));
    refresh.tick().await;
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if let Err(err) = scheduler.sync_from_store().await {
                    error!(?err, "failed to refresh scope settings");
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    error!(?err, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}
