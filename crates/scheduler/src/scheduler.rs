//! Notification scheduler
//!
//! Each tick lists the events whose notification instant falls in the next
//! interval, publishes one Notification per event routed by user id, and
//! purges events past the retention period.

use std::sync::Arc;
use std::time::Duration;

use calendar_core::{EventStore, Notification, NotificationChannel};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;

/// Scheduler status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Waiting for the next tick
    Idle,
    /// A tick is in progress
    Processing,
    /// The run loop has returned
    Stopped,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Events found due in the window
    pub due: usize,
    /// Notifications accepted by the channel
    pub published: usize,
    /// Notifications that could not be encoded or published
    pub failed: usize,
    /// Events removed by retention cleanup
    pub purged: u64,
}

/// Periodic notification scheduler
///
/// # Example
///
/// ```ignore
/// let scheduler = Scheduler::new(store, channel, SchedulerConfig::default());
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
/// // ... later
/// shutdown_tx.send(true)?;
/// handle.await?;
/// ```
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    channel: Arc<dyn NotificationChannel>,
    config: SchedulerConfig,
    status: RwLock<SchedulerStatus>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        channel: Arc<dyn NotificationChannel>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            channel,
            config,
            status: RwLock::new(SchedulerStatus::Idle),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status.read()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run ticks every `interval` until shutdown is signaled.
    ///
    /// The first tick fires one interval after start. A tick in progress
    /// completes before the loop observes shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention_period.as_secs(),
            "Scheduler started"
        );

        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                    }
                    break;
                }
            }
        }

        *self.status.write() = SchedulerStatus::Stopped;
        info!("Scheduler stopped");
    }

    /// Run one scheduling pass at clock reading `now`.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        *self.status.write() = SchedulerStatus::Processing;
        let mut report = TickReport::default();

        let before = shift(now, self.config.interval, true);
        match self.store.list_due_before(now, before).await {
            Ok(events) => {
                report.due = events.len();
                for event in &events {
                    let notification = Notification::for_event(event, now);
                    match self.publish(&notification).await {
                        Ok(()) => {
                            report.published += 1;
                            debug!(event_id = %event.id, user_id = %event.user_id, "Notification published");
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!(event_id = %event.id, user_id = %event.user_id, error = %e, "Failed to publish notification");
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to list due events");
            }
        }

        let cutoff = shift(now, self.config.retention_period, false);
        match self.store.delete_older_than(cutoff).await {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, %cutoff, "Failed to delete expired events"),
        }

        if report.due > 0 || report.purged > 0 || report.failed > 0 {
            info!(
                due = report.due,
                published = report.published,
                failed = report.failed,
                purged = report.purged,
                "Tick completed"
            );
        } else {
            debug!("Tick completed, nothing due");
        }

        *self.status.write() = SchedulerStatus::Idle;
        report
    }

    async fn publish(&self, notification: &Notification) -> Result<(), calendar_core::ChannelError> {
        let body = notification.to_bytes()?;
        self.channel
            .publish(notification.routing_key(), body)
            .await
    }
}

/// Move `at` forward or backward by `by`, saturating at the representable range.
fn shift(at: DateTime<Utc>, by: Duration, forward: bool) -> DateTime<Utc> {
    let shifted = chrono::Duration::from_std(by).ok().and_then(|by| {
        if forward {
            at.checked_add_signed(by)
        } else {
            at.checked_sub_signed(by)
        }
    });
    match (shifted, forward) {
        (Some(at), _) => at,
        (None, true) => DateTime::<Utc>::MAX_UTC,
        (None, false) => DateTime::<Utc>::MIN_UTC,
    }
}
