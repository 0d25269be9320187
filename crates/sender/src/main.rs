use anyhow::{Context, Result};
use calendar_bus::build_channel;
use calendar_core::telemetry::{init_tracing, TelemetryConfig};
use calendar_sender::{Sender, Settings};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "calendar_sender=debug,info")
    // - CALENDAR_CONFIG: Path to the YAML config file
    init_tracing(TelemetryConfig::from_env(
        "calendar-sender",
        "calendar_sender=debug,calendar_bus=info,info",
    ));

    tracing::info!("calendar-sender starting...");

    let settings = Settings::load().context("Failed to load configuration")?;

    let notifications = build_channel(&settings.bus)
        .await
        .context("Failed to initialize notification bus")?;
    let statuses = build_channel(&settings.status_bus())
        .await
        .context("Failed to initialize status bus")?;

    tracing::info!(
        queue = %settings.sender.queue,
        status_exchange = %settings.sender.status_exchange,
        "Starting sender"
    );

    let sender = Sender::new(notifications.clone(), statuses.clone(), settings.sender);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner = tokio::spawn(async move { sender.run(shutdown_rx).await });

    let report = tokio::select! {
        result = &mut runner => result.context("Sender task failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            runner.await.context("Sender task failed")?
        }
    };
    let report = report.context("Failed to consume notifications")?;

    for channel in [notifications, statuses] {
        if let Err(e) = channel.close().await {
            tracing::warn!(error = %e, "Failed to close channel");
        }
    }

    tracing::info!(
        received = report.received,
        acknowledged = report.acknowledged,
        "Sender shutdown complete"
    );
    Ok(())
}
