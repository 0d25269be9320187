//! Notification sender
//!
//! Consumes notifications from one queue and acknowledges each with a
//! `delivered` NotificationStatus on the status exchange.

use std::sync::Arc;

use calendar_core::{
    ChannelError, MessageStream, Notification, NotificationChannel, NotificationStatus,
    NOTIFICATION_STATUS_DESTINATION,
};
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SenderConfig;

/// Errors while handling one message
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Message body is not a notification
    #[error("invalid notification: {0}")]
    Decode(#[from] serde_json::Error),

    /// Status could not be published
    #[error("failed to publish status: {0}")]
    Publish(#[from] ChannelError),
}

/// Counters for one run of the consume loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderReport {
    /// Messages taken from the queue
    pub received: u64,
    /// Statuses published
    pub acknowledged: u64,
    /// Messages that could not be decoded
    pub dropped: u64,
    /// Statuses that could not be published
    pub failed: u64,
}

/// Notification consumer
pub struct Sender {
    notifications: Arc<dyn NotificationChannel>,
    statuses: Arc<dyn NotificationChannel>,
    config: SenderConfig,
}

impl Sender {
    /// `notifications` is consumed, `statuses` receives acknowledgements.
    pub fn new(
        notifications: Arc<dyn NotificationChannel>,
        statuses: Arc<dyn NotificationChannel>,
        config: SenderConfig,
    ) -> Self {
        Self {
            notifications,
            statuses,
            config,
        }
    }

    /// Consume until shutdown or until the channel closes the stream.
    ///
    /// Only failing to attach to the queue is an error; per-message failures
    /// are logged and counted.
    pub async fn run(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<SenderReport, ChannelError> {
        let stream = self.notifications.consume(&self.config.queue).await?;
        info!(queue = %self.config.queue, "Sender started");
        Ok(self.process(stream, shutdown_rx).await)
    }

    /// Handle messages from an attached stream until it ends or shutdown.
    pub async fn process(
        &self,
        mut stream: MessageStream,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SenderReport {
        let mut report = SenderReport::default();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                message = stream.next() => {
                    let Some(body) = message else {
                        info!(queue = %self.config.queue, "Notification stream ended");
                        break;
                    };
                    report.received += 1;
                    match self.handle(&body).await {
                        Ok(status) => {
                            report.acknowledged += 1;
                            debug!(notification_id = %status.notification_id, "Delivery acknowledged");
                        }
                        Err(SenderError::Decode(e)) => {
                            report.dropped += 1;
                            warn!(error = %e, "Dropping undecodable message");
                        }
                        Err(SenderError::Publish(e)) => {
                            report.failed += 1;
                            error!(error = %e, "Failed to publish delivery status");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            received = report.received,
            acknowledged = report.acknowledged,
            dropped = report.dropped,
            failed = report.failed,
            "Sender stopped"
        );
        report
    }

    /// Decode one message, deliver it and publish its status.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn handle(&self, body: &[u8]) -> Result<NotificationStatus, SenderError> {
        let notification = Notification::from_bytes(body)?;
        info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            title = %notification.title,
            time = %notification.event_start_time,
            "Notification delivered"
        );

        let status = NotificationStatus::delivered(&notification, Utc::now());
        self.statuses
            .publish(NOTIFICATION_STATUS_DESTINATION, status.to_bytes()?)
            .await?;
        Ok(status)
    }
}
