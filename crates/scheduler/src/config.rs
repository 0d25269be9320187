// Scheduler configuration
//
// The `scheduler` section of the config file plus the whole settings file
// as seen by the scheduler binary.

use std::time::Duration;

use calendar_bus::{BusConfig, BusKind};
use calendar_core::config::env_parse;
use calendar_core::ConfigError;
use calendar_storage::{StorageConfig, StorageKind};
use serde::{Deserialize, Serialize};

/// Default lookahead and tick period
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
/// Default age after end time at which events are purged
pub const DEFAULT_RETENTION_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick period, also the lookahead window of each tick
    #[serde(rename = "interval_secs", with = "duration_secs")]
    pub interval: Duration,

    /// Events that ended longer ago than this are purged
    #[serde(rename = "retention_period_secs", with = "duration_secs")]
    pub retention_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            retention_period: DEFAULT_RETENTION_PERIOD,
        }
    }
}

impl SchedulerConfig {
    /// Create a new scheduler configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retention period
    pub fn with_retention_period(mut self, retention: Duration) -> Self {
        self.retention_period = retention;
        self
    }

    /// Apply `SCHEDULER_INTERVAL_SECS` and `SCHEDULER_RETENTION_SECS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(secs) = env_parse::<u64>("SCHEDULER_INTERVAL_SECS")? {
            self.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SCHEDULER_RETENTION_SECS")? {
            self.retention_period = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        if chrono::Duration::from_std(self.retention_period).is_err() {
            return Err(ConfigError::Invalid(
                "scheduler.retention_period_secs is out of range".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings read by the scheduler binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub bus: BusConfig,
    pub scheduler: SchedulerConfig,
}

impl Settings {
    /// Load the config file, apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings: Settings = calendar_core::config::load()?;
        settings.storage.apply_env()?;
        settings.bus.apply_env()?;
        settings.scheduler.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    ///
    /// In-memory storage or bus is private to this process: the store would
    /// never see events written through the API and published notifications
    /// would never reach a sender, so both are rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.bus.validate()?;
        self.scheduler.validate()?;
        if self.storage.kind == StorageKind::Memory {
            return Err(ConfigError::Invalid(
                "the scheduler needs shared storage: set storage.kind (STORAGE_KIND) to postgres"
                    .to_string(),
            ));
        }
        if self.bus.kind == BusKind::Memory {
            return Err(ConfigError::Invalid(
                "the scheduler needs a shared bus: set bus.kind (BUS_KIND) to postgres".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde support for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.retention_period, Duration::from_secs(31_536_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = SchedulerConfig::new().with_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_from_yaml() {
        let settings: Settings = calendar_core::config::parse_yaml(
            r#"
storage:
  kind: memory
scheduler:
  interval_secs: 15
  retention_period_secs: 3600
sender:
  queue: ignored-here
"#,
        )
        .unwrap();
        assert_eq!(settings.scheduler.interval, Duration::from_secs(15));
        assert_eq!(settings.scheduler.retention_period, Duration::from_secs(3600));
        assert_eq!(settings.bus.exchange, "notifications");
    }

    #[test]
    fn test_in_memory_backends_are_rejected() {
        assert!(Settings::default().validate().is_err());

        let settings: Settings = calendar_core::config::parse_yaml(
            r#"
storage:
  kind: postgres
  url: postgres://db/calendar
bus:
  kind: memory
"#,
        )
        .unwrap();
        assert!(settings.validate().is_err());

        let settings: Settings = calendar_core::config::parse_yaml(
            r#"
storage:
  kind: postgres
  url: postgres://db/calendar
bus:
  kind: postgres
  url: postgres://db/calendar
"#,
        )
        .unwrap();
        assert!(settings.validate().is_ok());
    }
}
