// Input validation for event APIs
//
// Hard size limits on free-text fields plus conversion of wire values
// (Unix seconds) into domain values. Domain invariants are checked by
// Event::validate.

use super::common::{ApiError, ErrorResponse};
use axum::http::StatusCode;
use axum::Json;
use calendar_core::EventValidationError;
use chrono::{DateTime, Utc};

// =============================================================================
// Input Size Limits
// =============================================================================

/// Maximum size for the event title.
pub const MAX_TITLE_BYTES: usize = 1024; // 1 KB

/// Maximum size for the event description.
pub const MAX_DESCRIPTION_BYTES: usize = 10 * 1024; // 10 KB

/// Maximum size for the owning user id.
pub const MAX_USER_ID_BYTES: usize = 256;

// =============================================================================
// Validation Functions
// =============================================================================

/// Rejected input, reported to the client as 400
#[derive(Debug)]
pub struct ValidationError(pub EventValidationError);

impl From<EventValidationError> for ValidationError {
    fn from(e: EventValidationError) -> Self {
        Self(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        tracing::warn!("Rejected event input: {}", e.0);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.0.to_string())),
        )
    }
}

fn check_size(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        tracing::warn!(
            "Event {} exceeds limit: {} bytes (max: {})",
            field,
            value.len(),
            max
        );
        return Err(EventValidationError::TooLarge { field, max }.into());
    }
    Ok(())
}

/// Validate the size of the free-text fields
pub fn validate_text_sizes(
    user_id: &str,
    title: &str,
    description: Option<&str>,
) -> Result<(), ValidationError> {
    check_size("userId", user_id, MAX_USER_ID_BYTES)?;
    check_size("title", title, MAX_TITLE_BYTES)?;
    if let Some(description) = description {
        check_size("description", description, MAX_DESCRIPTION_BYTES)?;
    }
    Ok(())
}

/// Convert Unix seconds into a UTC timestamp
pub fn timestamp(secs: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp(secs, 0).ok_or(EventValidationError::InvalidTimestamp(secs).into())
}

/// Convert the wire `notifyBefore` into whole seconds. Missing means zero.
pub fn notify_before(secs: Option<i64>) -> Result<u32, ValidationError> {
    let secs = secs.unwrap_or(0);
    if secs < 0 {
        return Err(EventValidationError::NegativeNotifyBefore(secs).into());
    }
    u32::try_from(secs).map_err(|_| EventValidationError::NotifyBeforeOutOfRange(secs).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_sizes_at_limit_pass() {
        let user = "u".repeat(MAX_USER_ID_BYTES);
        let title = "t".repeat(MAX_TITLE_BYTES);
        let description = "d".repeat(MAX_DESCRIPTION_BYTES);
        assert!(validate_text_sizes(&user, &title, Some(&description)).is_ok());
    }

    #[test]
    fn test_text_sizes_over_limit_fail() {
        let title = "t".repeat(MAX_TITLE_BYTES + 1);
        let err = validate_text_sizes("u1", &title, None).unwrap_err();
        assert_eq!(
            err.0,
            EventValidationError::TooLarge {
                field: "title",
                max: MAX_TITLE_BYTES
            }
        );

        let user = "u".repeat(MAX_USER_ID_BYTES + 1);
        assert!(validate_text_sizes(&user, "ok", None).is_err());

        let description = "d".repeat(MAX_DESCRIPTION_BYTES + 1);
        assert!(validate_text_sizes("u1", "ok", Some(&description)).is_err());
    }

    #[test]
    fn test_notify_before() {
        assert_eq!(notify_before(None).unwrap(), 0);
        assert_eq!(notify_before(Some(600)).unwrap(), 600);
        assert_eq!(
            notify_before(Some(-1)).unwrap_err().0,
            EventValidationError::NegativeNotifyBefore(-1)
        );
        assert!(notify_before(Some(i64::MAX)).is_err());
    }

    #[test]
    fn test_timestamp() {
        assert_eq!(timestamp(0).unwrap().timestamp(), 0);
        assert_eq!(
            timestamp(i64::MAX).unwrap_err().0,
            EventValidationError::InvalidTimestamp(i64::MAX)
        );
    }
}
