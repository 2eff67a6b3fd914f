use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod runtime;

use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting agenda scheduler");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runtime = runtime::Runtime::build(config, shutdown_rx).await?;

    runtime
        .scheduler
        .schedule_daily_tasks()
        .await
        .context("failed to arm the daily reminder check")?;

    for stats in runtime.scheduler.queue_stats().await? {
        info!(
            "Queue {}: {} waiting, {} delayed, {} active, {} failed",
            stats.queue, stats.counts.waiting, stats.counts.delayed, stats.counts.active, stats.counts.failed
        );
    }

    let workers = runtime.spawn_workers();
    info!("Workers running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;

    info!("Shutdown requested, waiting for in-flight jobs");
    shutdown_tx.send_replace(true);

    for handle in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Worker pool stopped with error: {}", e),
            Err(e) => error!("Worker pool panicked: {}", e),
        }
    }

    info!("Agenda scheduler stopped");
    Ok(())
}
