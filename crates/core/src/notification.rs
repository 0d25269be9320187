// Notification messages
//
// Wire types exchanged through the NotificationChannel. Both are JSON encoded;
// timestamps are RFC 3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Fixed destination for delivery acknowledgements.
pub const NOTIFICATION_STATUS_DESTINATION: &str = "notification_status";

/// Reminder about an upcoming event, routed by the owner's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Id of the event this notification is about.
    pub id: String,
    pub title: String,
    pub description: String,
    pub user_id: String,
    /// Event start time.
    #[serde(rename = "time")]
    pub event_start_time: DateTime<Utc>,
    /// Instant at which the scheduler produced the notification.
    pub notify_at: DateTime<Utc>,
}

impl Notification {
    /// Build the notification for `event`, produced by the tick at `notified_at`.
    pub fn for_event(event: &Event, notified_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            user_id: event.user_id.clone(),
            event_start_time: event.start_time,
            notify_at: notified_at,
        }
    }

    /// Routing key used when publishing this notification.
    pub fn routing_key(&self) -> &str {
        &self.user_id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Delivery outcome reported by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Delivered => write!(f, "delivered"),
        }
    }
}

/// Acknowledgement that a notification was received by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    pub notification_id: String,
    pub event_id: String,
    pub user_id: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl NotificationStatus {
    /// Acknowledge `notification` as delivered at `timestamp`.
    pub fn delivered(notification: &Notification, timestamp: DateTime<Utc>) -> Self {
        Self {
            notification_id: notification.id.clone(),
            event_id: notification.id.clone(),
            user_id: notification.user_id.clone(),
            status: DeliveryStatus::Delivered,
            timestamp,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
