// Configuration loading
//
// Every binary reads one optional YAML file (path in CALENDAR_CONFIG) into
// its own settings struct, then applies environment overrides section by
// section. Sections a binary does not use are ignored, so one file can serve
// the API, the scheduler and the sender.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;

/// Environment variable holding the YAML config path.
pub const CONFIG_PATH_ENV: &str = "CALENDAR_CONFIG";

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load `.env` (if present) and the YAML file named by `CALENDAR_CONFIG`.
///
/// Without `CALENDAR_CONFIG` the defaults of `T` are used.
pub fn load<T>() -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    // A missing .env is normal outside development
    let _ = dotenvy::dotenv();

    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_file(Path::new(&path)),
        _ => {
            tracing::info!("No {} set, using built-in defaults", CONFIG_PATH_ENV);
            Ok(T::default())
        }
    }
}

/// Read and parse a YAML config file.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    tracing::info!("Loading config from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_yaml(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse YAML text. An empty document yields the defaults of `T`.
pub fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T, serde_yaml::Error> {
    if content.trim().is_empty() {
        return serde_yaml::from_str("{}");
    }
    serde_yaml::from_str(content)
}

/// Read an environment variable, treating empty values as unset.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable.
pub fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

/// Read a boolean environment variable (`true`/`false`/`1`/`0`/`yes`/`no`).
pub fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    match env_string(name) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        },
        None => Ok(None),
    }
}
