// HTTP server configuration

use std::time::Duration;

use calendar_core::config::{env_parse, env_string};
use calendar_core::ConfigError;
use calendar_storage::StorageConfig;
use serde::{Deserialize, Serialize};

/// `http` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Requests running longer than this are answered with 408
    pub request_timeout_secs: u64,
    /// Prefix for the `/v1` routes, e.g. `/api`. Empty means none.
    pub api_prefix: String,
    /// Origins allowed by CORS. Empty means same-origin only.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            api_prefix: String::new(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl HttpConfig {
    /// Apply `HTTP_HOST`, `HTTP_PORT`, `HTTP_REQUEST_TIMEOUT_SECS`, `API_PREFIX`
    /// and `CORS_ALLOWED_ORIGINS` (comma separated).
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(host) = env_string("HTTP_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse::<u16>("HTTP_PORT")? {
            self.port = port;
        }
        if let Some(secs) = env_parse::<u64>("HTTP_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = secs;
        }
        if let Some(prefix) = env_string("API_PREFIX") {
            self.api_prefix = prefix;
        }
        if let Some(origins) = env_string("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.api_prefix.is_empty()
            && (!self.api_prefix.starts_with('/') || self.api_prefix.ends_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "http.api_prefix must start with '/' and not end with '/': {}",
                self.api_prefix
            )));
        }
        Ok(())
    }

    /// Address to bind, `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settings read by the API binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

impl Settings {
    /// Load the config file, apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings: Settings = calendar_core::config::load()?;
        settings.storage.apply_env()?;
        settings.http.apply_env()?;
        settings.storage.validate()?;
        settings.http.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_from_yaml() {
        let settings: Settings = calendar_core::config::parse_yaml(
            r#"
storage:
  kind: memory
http:
  port: 9000
  api_prefix: /api
  cors_allowed_origins:
    - https://app.example.com
scheduler:
  interval_secs: 5
"#,
        )
        .unwrap();
        assert_eq!(settings.http.port, 9000);
        assert_eq!(settings.http.host, "0.0.0.0");
        assert_eq!(settings.http.api_prefix, "/api");
        assert_eq!(settings.http.cors_allowed_origins.len(), 1);
        assert!(settings.http.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = HttpConfig {
            request_timeout_secs: 0,
            ..HttpConfig::default()
        };
        assert!(config.validate().is_err());

        for prefix in ["api", "/api/"] {
            let config = HttpConfig {
                api_prefix: prefix.to_string(),
                ..HttpConfig::default()
            };
            assert!(config.validate().is_err(), "{prefix}");
        }
    }
}
