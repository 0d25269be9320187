//! In-memory implementation of EventStore for dev mode and tests

use std::collections::HashMap;

use async_trait::async_trait;
use calendar_core::store::sort_events;
use calendar_core::{find_conflict, Event, EventStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

/// In-memory implementation of EventStore
///
/// All events live in one map behind one reader/writer lock. Create and
/// update run their conflict check and write under a single exclusive
/// acquisition, which gives the same guarantees as the PostgreSQL store.
///
/// # Example
///
/// ```
/// use calendar_storage::InMemoryEventStore;
///
/// let store = InMemoryEventStore::new();
/// ```
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    fn collect<F>(&self, filter: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let mut events: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|e| filter(e))
            .cloned()
            .collect();
        sort_events(&mut events);
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, mut event: Event) -> Result<String, StoreError> {
        if event.id.is_empty() {
            event.id = Event::generate_id();
        }

        let mut events = self.events.write();
        if events.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists(event.id));
        }
        if let Some(conflict) = find_conflict(&event, events.values()) {
            return Err(StoreError::ConflictOverlap {
                id: event.id.clone(),
                conflicting_id: conflict.id.clone(),
            });
        }

        let id = event.id.clone();
        debug!(event_id = %id, user_id = %event.user_id, "Event created");
        events.insert(id.clone(), event);
        Ok(id)
    }

    async fn update(&self, event: Event) -> Result<(), StoreError> {
        let mut events = self.events.write();
        if !events.contains_key(&event.id) {
            return Err(StoreError::NotFound(event.id));
        }
        if let Some(conflict) = find_conflict(&event, events.values()) {
            return Err(StoreError::ConflictOverlap {
                id: event.id.clone(),
                conflicting_id: conflict.id.clone(),
            });
        }

        debug!(event_id = %event.id, user_id = %event.user_id, "Event updated");
        events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.events.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|_, e| !e.ended_before(cutoff));
        let removed = (before - events.len()) as u64;
        if removed > 0 {
            debug!(removed, %cutoff, "Expired events removed");
        }
        Ok(removed)
    }

    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError> {
        self.events
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self.collect(|_| true))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        Ok(self.collect(|e| e.user_id == user_id))
    }

    async fn list_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self.collect(|e| e.user_id == user_id && e.intersects_range(from, to)))
    }

    async fn list_due_before(
        &self,
        now: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self.collect(|e| e.is_due(now, before)))
    }
}
