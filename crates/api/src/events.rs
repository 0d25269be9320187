// Event CRUD HTTP routes
//
// Timestamps are Unix seconds on the wire. Overlap and duplicate ids are
// reported as 409, malformed input as 400.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use calendar_core::{Event, EventStore, StoreError};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common::{ApiError, ErrorResponse, ListResponse};
use super::validation::{self, ValidationError};

/// Request to create or replace an event
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// Owner of the event. Overlap is checked per user.
    #[schema(example = "user-42")]
    pub user_id: String,
    #[schema(example = "Design review")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Start of the event, Unix seconds
    #[schema(example = 1_900_000_000)]
    pub start_time: i64,
    /// End of the event, Unix seconds. Must be after `startTime`.
    #[schema(example = 1_900_003_600)]
    pub end_time: i64,
    /// Seconds before `startTime` at which to notify the owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 600)]
    pub notify_before: Option<i64>,
}

impl EventRequest {
    /// Convert into a domain event, checking every input rule.
    pub fn into_event(self, id: String) -> Result<Event, ValidationError> {
        validation::validate_text_sizes(&self.user_id, &self.title, self.description.as_deref())?;
        let event = Event {
            id,
            user_id: self.user_id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            start_time: validation::timestamp(self.start_time)?,
            end_time: validation::timestamp(self.end_time)?,
            notify_before: validation::notify_before(self.notify_before)?,
        };
        event.validate()?;
        Ok(event)
    }
}

/// Event as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    /// Unix seconds
    pub start_time: i64,
    /// Unix seconds
    pub end_time: i64,
    pub notify_before: i64,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            user_id: event.user_id,
            title: event.title,
            description: event.description,
            start_time: event.start_time.timestamp(),
            end_time: event.end_time.timestamp(),
            notify_before: i64::from(event.notify_before),
        }
    }
}

/// Response to a successful create
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEventResponse {
    /// Identifier assigned by the store
    pub id: String,
    pub event: EventResponse,
}

/// Filters for listing events
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListEventsQuery {
    /// Only events owned by this user
    pub user_id: Option<String>,
    /// Range start, Unix seconds. Requires `userId` and `to`.
    pub from: Option<i64>,
    /// Range end, Unix seconds. Requires `userId` and `from`.
    pub to: Option<i64>,
}

/// App state for event routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", post(create_event).get(list_events))
        .route(
            "/v1/events/:event_id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .with_state(state)
}

/// Map a store error to a response, logging backend failures
fn store_error(action: &str, e: StoreError) -> ApiError {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) | StoreError::ConflictOverlap { .. } => StatusCode::CONFLICT,
        StoreError::Database(_) | StoreError::Serialization(_) => {
            tracing::error!("Failed to {}: {}", action, e);
            return ErrorResponse::new("Internal server error")
                .into_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    tracing::debug!("Failed to {}: {}", action, e);
    ErrorResponse::new(e.to_string()).into_response(status)
}

fn bad_request(message: &str) -> ApiError {
    tracing::warn!("Rejected event query: {}", message);
    ErrorResponse::new(message).into_response(StatusCode::BAD_REQUEST)
}

/// POST /v1/events - Create a new event
#[utoipa::path(
    post,
    path = "/v1/events",
    request_body = EventRequest,
    responses(
        (status = 201, description = "Event created successfully", body = CreateEventResponse),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 409, description = "Event overlaps another event of the same user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<CreateEventResponse>), ApiError> {
    let mut event = req.into_event(String::new())?;
    let id = state
        .store
        .create(event.clone())
        .await
        .map_err(|e| store_error("create event", e))?;
    event.id = id.clone();

    tracing::info!(event_id = %id, user_id = %event.user_id, "Event created");
    Ok((
        StatusCode::CREATED,
        Json(CreateEventResponse {
            id,
            event: event.into(),
        }),
    ))
}

/// GET /v1/events - List events
#[utoipa::path(
    get,
    path = "/v1/events",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "List of events ordered by start time", body = ListResponse<EventResponse>),
        (status = 400, description = "Invalid filter combination", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ListResponse<EventResponse>>, ApiError> {
    let events = match (query.user_id, query.from, query.to) {
        (None, None, None) => state.store.list().await,
        (Some(user_id), None, None) => state.store.list_by_user(&user_id).await,
        (Some(user_id), Some(from), Some(to)) => {
            let from = validation::timestamp(from)?;
            let to = validation::timestamp(to)?;
            if from > to {
                return Err(bad_request("from must not be after to"));
            }
            state.store.list_by_user_in_range(&user_id, from, to).await
        }
        (None, _, _) => return Err(bad_request("from and to require userId")),
        (Some(_), _, _) => return Err(bad_request("from and to must be given together")),
    }
    .map_err(|e| store_error("list events", e))?;

    Ok(Json(
        events
            .into_iter()
            .map(EventResponse::from)
            .collect::<Vec<_>>()
            .into(),
    ))
}

/// GET /v1/events/{event_id} - Get event by ID
#[utoipa::path(
    get,
    path = "/v1/events/{event_id}",
    params(
        ("event_id" = String, Path, description = "Event ID")
    ),
    responses(
        (status = 200, description = "Event found", body = EventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state
        .store
        .get_by_id(&event_id)
        .await
        .map_err(|e| store_error("get event", e))?;

    Ok(Json(event.into()))
}

/// PUT /v1/events/{event_id} - Replace an event
#[utoipa::path(
    put,
    path = "/v1/events/{event_id}",
    params(
        ("event_id" = String, Path, description = "Event ID")
    ),
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event updated successfully", body = EventResponse),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Event overlaps another event of the same user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(req): Json<EventRequest>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = req.into_event(event_id)?;
    state
        .store
        .update(event.clone())
        .await
        .map_err(|e| store_error("update event", e))?;

    tracing::info!(event_id = %event.id, user_id = %event.user_id, "Event updated");
    Ok(Json(event.into()))
}

/// DELETE /v1/events/{event_id} - Delete an event
#[utoipa::path(
    delete,
    path = "/v1/events/{event_id}",
    params(
        ("event_id" = String, Path, description = "Event ID")
    ),
    responses(
        (status = 204, description = "Event deleted successfully"),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete(&event_id)
        .await
        .map_err(|e| store_error("delete event", e))?;

    tracing::info!(event_id = %event_id, "Event deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use calendar_storage::InMemoryEventStore;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const T0: i64 = 1_900_000_000;
    const HOUR: i64 = 3600;

    fn test_app() -> Router {
        routes(AppState::new(Arc::new(InMemoryEventStore::new())))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn event_body(user: &str, start: i64, end: i64) -> Value {
        json!({
            "userId": user,
            "title": "Planning",
            "startTime": start,
            "endTime": end,
            "notifyBefore": 600,
        })
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let app = test_app();
        let mut body = event_body("u1", T0, T0 + HOUR);
        body["description"] = json!("Quarterly planning");

        let (status, created) = send(&app, Method::POST, "/v1/events", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());
        assert_eq!(created["event"]["id"], id.as_str());

        let (status, fetched) = send(&app, Method::GET, &format!("/v1/events/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["userId"], "u1");
        assert_eq!(fetched["title"], "Planning");
        assert_eq!(fetched["description"], "Quarterly planning");
        assert_eq!(fetched["startTime"], T0);
        assert_eq!(fetched["endTime"], T0 + HOUR);
        assert_eq!(fetched["notifyBefore"], 600);
    }

    #[tokio::test]
    async fn test_overlap_is_checked_per_user() {
        let app = test_app();
        let (status, _) =
            send(&app, Method::POST, "/v1/events", Some(event_body("u1", T0, T0 + HOUR))).await;
        assert_eq!(status, StatusCode::CREATED);

        let half = T0 + HOUR / 2;
        let (status, body) =
            send(&app, Method::POST, "/v1/events", Some(event_body("u1", half, half + HOUR))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("overlaps"));

        let (status, _) =
            send(&app, Method::POST, "/v1/events", Some(event_body("u2", half, half + HOUR))).await;
        assert_eq!(status, StatusCode::CREATED);

        // Touching intervals do not overlap
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/events",
            Some(event_body("u1", T0 + HOUR, T0 + 2 * HOUR)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let app = test_app();

        let mut empty_title = event_body("u1", T0, T0 + HOUR);
        empty_title["title"] = json!("");
        let reversed = event_body("u1", T0 + HOUR, T0);
        let mut negative_notify = event_body("u1", T0, T0 + HOUR);
        negative_notify["notifyBefore"] = json!(-5);
        let mut long_title = event_body("u1", T0, T0 + HOUR);
        long_title["title"] = json!("x".repeat(validation::MAX_TITLE_BYTES + 1));

        for body in [empty_title, reversed, negative_notify, long_title] {
            let (status, response) = send(&app, Method::POST, "/v1/events", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(response["error"].is_string());
        }

        let (_, list) = send(&app, Method::GET, "/v1/events", None).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_and_delete_missing_return_404() {
        let app = test_app();
        let (status, _) = send(&app, Method::GET, "/v1/events/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/v1/events/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_removes_event() {
        let app = test_app();
        let (_, created) =
            send(&app, Method::POST, "/v1/events", Some(event_body("u1", T0, T0 + HOUR))).await;
        let uri = format!("/v1/events/{}", created["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update() {
        let app = test_app();
        let (_, first) =
            send(&app, Method::POST, "/v1/events", Some(event_body("u1", T0, T0 + HOUR))).await;
        let (_, second) = send(
            &app,
            Method::POST,
            "/v1/events",
            Some(event_body("u1", T0 + 2 * HOUR, T0 + 3 * HOUR)),
        )
        .await;
        let second_uri = format!("/v1/events/{}", second["id"].as_str().unwrap());

        // Moving the second event onto the first conflicts and changes nothing
        let (status, _) = send(
            &app,
            Method::PUT,
            &second_uri,
            Some(event_body("u1", T0 + HOUR / 2, T0 + 2 * HOUR)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (_, unchanged) = send(&app, Method::GET, &second_uri, None).await;
        assert_eq!(unchanged["startTime"], T0 + 2 * HOUR);

        // Extending an event over its own old interval is fine
        let mut body = event_body("u1", T0, T0 + 2 * HOUR);
        body["title"] = json!("Longer planning");
        let first_uri = format!("/v1/events/{}", first["id"].as_str().unwrap());
        let (status, updated) = send(&app, Method::PUT, &first_uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Longer planning");
        assert_eq!(updated["endTime"], T0 + 2 * HOUR);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/v1/events/missing",
            Some(event_body("u1", T0 + 5 * HOUR, T0 + 6 * HOUR)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let app = test_app();
        for (user, start) in [("u1", T0 + 4 * HOUR), ("u1", T0), ("u2", T0 + HOUR)] {
            let (status, _) =
                send(&app, Method::POST, "/v1/events", Some(event_body(user, start, start + HOUR))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, all) = send(&app, Method::GET, "/v1/events", None).await;
        assert_eq!(status, StatusCode::OK);
        let starts: Vec<i64> = all["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["startTime"].as_i64().unwrap())
            .collect();
        assert_eq!(starts, vec![T0, T0 + HOUR, T0 + 4 * HOUR]);

        let (_, mine) = send(&app, Method::GET, "/v1/events?userId=u1", None).await;
        assert_eq!(mine["data"].as_array().unwrap().len(), 2);

        let uri = format!("/v1/events?userId=u1&from={}&to={}", T0 + HOUR / 2, T0 + 2 * HOUR);
        let (status, range) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let range = range["data"].as_array().unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0]["startTime"], T0);
    }

    #[tokio::test]
    async fn test_list_rejects_partial_range() {
        let app = test_app();
        for uri in [
            format!("/v1/events?userId=u1&from={T0}"),
            format!("/v1/events?from={T0}&to={}", T0 + HOUR),
            format!("/v1/events?userId=u1&from={}&to={T0}", T0 + HOUR),
        ] {
            let (status, _) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }
}
