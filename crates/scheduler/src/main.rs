use anyhow::{Context, Result};
use calendar_bus::build_channel;
use calendar_core::telemetry::{init_tracing, TelemetryConfig};
use calendar_scheduler::{Scheduler, Settings};
use calendar_storage::StorageBackend;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "calendar_scheduler=debug,info")
    // - CALENDAR_CONFIG: Path to the YAML config file
    init_tracing(TelemetryConfig::from_env(
        "calendar-scheduler",
        "calendar_scheduler=debug,calendar_storage=info,calendar_bus=info,info",
    ));

    tracing::info!("calendar-scheduler starting...");

    let settings = Settings::load().context("Failed to load configuration")?;

    let storage = StorageBackend::from_config(&settings.storage)
        .await
        .context("Failed to initialize event storage")?;
    let channel = build_channel(&settings.bus)
        .await
        .context("Failed to initialize notification bus")?;

    tracing::info!(
        storage = storage.name(),
        exchange = %settings.bus.exchange,
        interval_secs = settings.scheduler.interval.as_secs(),
        "Starting scheduler"
    );

    let scheduler = Scheduler::new(storage.store(), channel.clone(), settings.scheduler);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    runner.await.context("Scheduler task failed")?;

    if let Err(e) = channel.close().await {
        tracing::warn!(error = %e, "Failed to close notification bus");
    }

    tracing::info!("Scheduler shutdown complete");
    Ok(())
}
