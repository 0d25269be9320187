// Event domain type
//
// An Event is a time slot owned by a single user. The store guarantees that
// the [start_time, end_time) intervals of one user never overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::intervals_overlap;

/// Calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Opaque identifier. Empty until the store assigns one on create.
    #[serde(default)]
    pub id: String,
    /// Owner of the event. Overlap is only checked between events of one user.
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds before `start_time` at which the owner wants to be notified.
    #[serde(default)]
    pub notify_before: u32,
}

impl Event {
    /// Generate a fresh event id (UUID v7, time ordered).
    pub fn generate_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Instant at which a notification for this event is due.
    ///
    /// `None` when that instant falls before the earliest representable time.
    pub fn notify_at(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .checked_sub_signed(Duration::seconds(i64::from(self.notify_before)))
    }

    /// Whether this event and `other` share at least one instant.
    ///
    /// Ownership is not considered here; callers compare events of one user.
    pub fn overlaps(&self, other: &Event) -> bool {
        intervals_overlap(
            self.start_time,
            self.end_time,
            other.start_time,
            other.end_time,
        )
    }

    /// Whether the event intersects the closed range `[from, to]`.
    pub fn intersects_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        !(self.end_time <= from || self.start_time >= to)
    }

    /// Whether a notification for this event should go out in the window
    /// `(now, before]`.
    ///
    /// Events that already started are never due, nor are events whose
    /// notify instant is unrepresentable.
    pub fn is_due(&self, now: DateTime<Utc>, before: DateTime<Utc>) -> bool {
        match self.notify_at() {
            Some(notify_at) => now < self.start_time && now < notify_at && notify_at <= before,
            None => false,
        }
    }

    /// Whether the event ended strictly before `cutoff`.
    pub fn ended_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.end_time < cutoff
    }

    /// Check the invariants every stored event must satisfy.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(EventValidationError::MissingUserId);
        }
        if self.title.trim().is_empty() {
            return Err(EventValidationError::MissingTitle);
        }
        if self.start_time >= self.end_time {
            return Err(EventValidationError::InvalidInterval {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }
}

/// Malformed event input, rejected before it reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("user id is required")]
    MissingUserId,

    #[error("title is required")]
    MissingTitle,

    #[error("start time {start} must be before end time {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("notify before must be a non-negative number of seconds, got {0}")]
    NegativeNotifyBefore(i64),

    #[error("notify before of {0} seconds is out of range")]
    NotifyBeforeOutOfRange(i64),

    #[error("{field} exceeds {max} bytes")]
    TooLarge { field: &'static str, max: usize },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(start: i64, end: i64, notify_before: u32) -> Event {
        Event {
            id: Event::generate_id(),
            user_id: "u1".to_string(),
            title: "Standup".to_string(),
            description: String::new(),
            start_time: at(start),
            end_time: at(end),
            notify_before,
        }
    }

    #[test]
    fn test_notify_at_subtracts_notify_before() {
        let e = event(100, 200, 30);
        assert_eq!(e.notify_at(), Some(at(70)));
    }

    #[test]
    fn test_notify_instant_before_min_time_is_never_due() {
        let mut e = event(0, 10, 600);
        e.start_time = DateTime::<Utc>::MIN_UTC;
        e.end_time = DateTime::<Utc>::MIN_UTC + Duration::hours(1);
        assert!(e.validate().is_ok());
        assert_eq!(e.notify_at(), None);
        assert!(!e.is_due(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC));
        assert!(!e.is_due(at(0), at(60)));
    }

    #[test]
    fn test_is_due_window_bounds() {
        let e = event(20, 3600, 10);

        // notify instant (10) inside (0, 15]
        assert!(e.is_due(at(0), at(15)));
        // upper bound is inclusive
        assert!(e.is_due(at(0), at(10)));
        // notify instant not reached by the window yet
        assert!(!e.is_due(at(0), at(9)));
        // lower bound is exclusive
        assert!(!e.is_due(at(10), at(25)));
        // already started
        assert!(!e.is_due(at(20), at(35)));
    }

    #[test]
    fn test_zero_notify_before_is_due_until_start() {
        let e = event(20, 60, 0);
        assert!(e.is_due(at(5), at(20)));
        assert!(!e.is_due(at(20), at(40)));
    }

    #[test]
    fn test_intersects_range() {
        let e = event(100, 200, 0);
        assert!(e.intersects_range(at(150), at(300)));
        assert!(e.intersects_range(at(0), at(101)));
        assert!(!e.intersects_range(at(200), at(300)));
        assert!(!e.intersects_range(at(0), at(100)));
    }

    #[test]
    fn test_validate() {
        assert!(event(0, 10, 0).validate().is_ok());

        let mut e = event(0, 10, 0);
        e.user_id = "  ".to_string();
        assert_eq!(e.validate(), Err(EventValidationError::MissingUserId));

        let mut e = event(0, 10, 0);
        e.title = String::new();
        assert_eq!(e.validate(), Err(EventValidationError::MissingTitle));

        assert!(matches!(
            event(10, 10, 0).validate(),
            Err(EventValidationError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let e = event(0, 10, 5);
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("startTime").is_some());
        assert_eq!(json["notifyBefore"], 5);
    }
}
