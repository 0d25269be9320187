// Tracing initialization
//
// Every binary installs one tracing-subscriber registry with an EnvFilter and
// a fmt layer. The filter comes from RUST_LOG or LOG_LEVEL and falls back to
// a per-binary default.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for log output
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Filter used when neither RUST_LOG nor LOG_LEVEL is set
    pub default_filter: String,
    /// Log filter (e.g., "info", "calendar_scheduler=debug")
    pub log_filter: Option<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "calendar".to_string(),
            default_filter: "info".to_string(),
            log_filter: None,
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `LOG_FORMAT`: `json` for JSON lines
    pub fn from_env(service_name: &str, default_filter: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            default_filter: default_filter.to_string(),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    /// Resolve the effective filter directives.
    pub fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global tracing subscriber.
///
/// Calling this twice (as tests may) leaves the first subscriber in place.
pub fn init_tracing(config: TelemetryConfig) {
    let filter = config.filter();

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    };

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(service = %config.service_name, "Tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "calendar");
        assert_eq!(config.default_filter, "info");
        assert!(config.log_filter.is_none());
        assert!(!config.json);
    }

    #[test]
    fn test_invalid_filter_falls_back_to_default() {
        let config = TelemetryConfig {
            log_filter: Some("calendar=loud".to_string()),
            default_filter: "warn".to_string(),
            ..TelemetryConfig::default()
        };
        assert_eq!(config.filter().to_string(), "warn");
    }
}
