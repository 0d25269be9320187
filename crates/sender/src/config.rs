// Sender configuration

use calendar_bus::{BusConfig, BusKind};
use calendar_core::config::env_string;
use calendar_core::{ConfigError, NOTIFICATION_STATUS_DESTINATION};
use serde::{Deserialize, Serialize};

/// `sender` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Queue holding notifications
    pub queue: String,
    /// Exchange receiving delivery statuses
    pub status_exchange: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            queue: "notifications".to_string(),
            status_exchange: NOTIFICATION_STATUS_DESTINATION.to_string(),
        }
    }
}

impl SenderConfig {
    /// Apply `SENDER_QUEUE` and `SENDER_STATUS_EXCHANGE`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(queue) = env_string("SENDER_QUEUE") {
            self.queue = queue;
        }
        if let Some(exchange) = env_string("SENDER_STATUS_EXCHANGE") {
            self.status_exchange = exchange;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::Invalid("sender.queue must not be empty".to_string()));
        }
        if self.status_exchange.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sender.status_exchange must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings read by the sender binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusConfig,
    pub sender: SenderConfig,
}

impl Settings {
    /// Load the config file, apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings: Settings = calendar_core::config::load()?;
        settings.bus.apply_env()?;
        settings.sender.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    ///
    /// An in-memory bus is private to this process, so no scheduler could
    /// ever publish to it; it is rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus.validate()?;
        self.sender.validate()?;
        if self.bus.kind == BusKind::Memory {
            return Err(ConfigError::Invalid(
                "the sender needs a shared bus: set bus.kind (BUS_KIND) to postgres".to_string(),
            ));
        }
        Ok(())
    }

    /// Bus settings for the status exchange.
    pub fn status_bus(&self) -> BusConfig {
        self.bus.for_exchange(self.sender.status_exchange.clone())
    }
}
