// Conflict detection
//
// Intervals are half-open: [start, end). Two events that touch at a boundary
// (one ends exactly when the other starts) do not conflict.

use chrono::{DateTime, Utc};

use crate::event::Event;

/// Half-open interval overlap test.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Find the first stored event that conflicts with `candidate`.
///
/// Only events of the candidate's user are considered, and an event with the
/// candidate's own id is skipped so updates never conflict with themselves.
pub fn find_conflict<'a, I>(candidate: &Event, existing: I) -> Option<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    existing.into_iter().find(|other| {
        other.user_id == candidate.user_id
            && other.id != candidate.id
            && candidate.overlaps(other)
    })
}
