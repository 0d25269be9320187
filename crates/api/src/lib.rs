// Calendar HTTP API
//
// Router construction lives here so tests can drive the full app with
// tower::ServiceExt::oneshot; main.rs adds server-only layers.

pub mod common;
pub mod config;
pub mod events;
pub mod health;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use calendar_core::EventStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use common::{ErrorResponse, ListResponse};
pub use config::{HttpConfig, Settings};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        events::create_event,
        events::list_events,
        events::get_event,
        events::update_event,
        events::delete_event,
    ),
    components(
        schemas(
            ErrorResponse,
            health::HealthResponse,
            events::EventRequest,
            events::EventResponse,
            events::CreateEventResponse,
            ListResponse<events::EventResponse>,
        )
    ),
    tags(
        (name = "events", description = "Calendar event management endpoints"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Calendar API",
        version = "0.1.0",
        description = "API for managing calendar events and their notification offsets",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

/// Build the application router: health, `/v1` routes under `api_prefix`
/// and the Swagger UI.
pub fn app(store: Arc<dyn EventStore>, storage: &'static str, api_prefix: &str) -> Router {
    let api_routes = events::routes(events::AppState::new(store));

    Router::new()
        .merge(health::routes(health::HealthState { storage }))
        .merge(build_router_with_prefix(api_routes, api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

/// Build router with optional API prefix
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
