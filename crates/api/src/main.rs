// Calendar API server

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use calendar_api::Settings;
use calendar_core::telemetry::{init_tracing, TelemetryConfig};
use calendar_storage::StorageBackend;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "calendar_api=debug,tower_http=debug,info")
    // - CALENDAR_CONFIG: Path to the YAML config file
    init_tracing(TelemetryConfig::from_env(
        "calendar-api",
        "calendar_api=debug,calendar_storage=info,tower_http=debug,info",
    ));

    tracing::info!("calendar-api starting...");

    let settings = Settings::load().context("Failed to load configuration")?;

    let storage = StorageBackend::from_config(&settings.storage)
        .await
        .context("Failed to initialize event storage")?;
    tracing::info!(storage = storage.name(), "Event storage ready");

    if !settings.http.api_prefix.is_empty() {
        tracing::info!(prefix = %settings.http.api_prefix, "API prefix configured");
    }

    let app = calendar_api::app(storage.store(), storage.name(), &settings.http.api_prefix);

    // Add CORS layer only if origins are configured
    let cors_origins: Vec<HeaderValue> = settings
        .http
        .cors_allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    let app = if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
        app
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]),
        )
    };

    let app = app
        .layer(TimeoutLayer::new(settings.http.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = settings.http.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
