// Calendar Core
//
// This crate provides the storage-agnostic core of the calendar service:
// - Domain types (Event, Notification, NotificationStatus)
// - The interval conflict detector shared by every EventStore backend
// - The due predicate used by the scheduler
// - Capability traits at the boundary (EventStore, NotificationChannel)
//
// Key design decisions:
// - Backends (memory, PostgreSQL) live in calendar-storage and calendar-bus
//   and are injected as Arc<dyn Trait>
// - Errors are typed with thiserror; binaries wrap them in anyhow
// - Logging goes through tracing; telemetry::init_tracing wires the subscriber

pub mod channel;
pub mod config;
pub mod conflict;
pub mod event;
pub mod notification;
pub mod store;
pub mod telemetry;

pub use channel::{
    topic_matches, Binding, ChannelError, MessageStream, NotificationChannel,
};
pub use config::ConfigError;
pub use conflict::{find_conflict, intervals_overlap};
pub use event::{Event, EventValidationError};
pub use notification::{
    DeliveryStatus, Notification, NotificationStatus, NOTIFICATION_STATUS_DESTINATION,
};
pub use store::{EventStore, StoreError};
