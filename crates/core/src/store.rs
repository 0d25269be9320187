//! EventStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::Event;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Event not found
    #[error("event not found: {0}")]
    NotFound(String),

    /// An event with this id already exists
    #[error("event already exists: {0}")]
    AlreadyExists(String),

    /// The event would overlap another event of the same user
    #[error("event {id} overlaps event {conflicting_id}")]
    ConflictOverlap { id: String, conflicting_id: String },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository of calendar events.
///
/// Implementations own the per-user non-overlap invariant: `create` and
/// `update` check for conflicts and write atomically with respect to other
/// writers of the same user.
///
/// All listings are ordered by `(start_time, id)`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event and return its id.
    ///
    /// An empty `event.id` asks the store to assign one.
    async fn create(&self, event: Event) -> Result<String, StoreError>;

    /// Replace an existing event. The overlap check skips the event itself.
    async fn update(&self, event: Event) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Remove every event whose end time is strictly before `cutoff`.
    ///
    /// Returns the number of removed events.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError>;

    async fn list(&self) -> Result<Vec<Event>, StoreError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError>;

    /// Events of `user_id` that intersect `[from, to]`.
    async fn list_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Events whose notification falls in `(now, before]` and that have not
    /// started at `now`. See [`Event::is_due`].
    async fn list_due_before(
        &self,
        now: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;
}

/// Sort events by `(start_time, id)`.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}
