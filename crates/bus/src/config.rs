// Bus configuration
//
// The `bus` section of the config file, plus construction of the configured
// NotificationChannel.

use std::str::FromStr;
use std::sync::Arc;

use calendar_core::config::{env_parse, env_string};
use calendar_core::{Binding, ChannelError, ConfigError, NotificationChannel};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::memory::InMemoryChannel;
use crate::poller::PollerConfig;
use crate::postgres::PostgresChannel;

/// Which NotificationChannel implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::Invalid(format!("unknown bus kind: {other}"))),
        }
    }
}

/// `bus` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub kind: BusKind,
    /// PostgreSQL connection URL, required for `postgres`
    pub url: Option<String>,
    pub exchange: String,
    /// Queue bindings; empty routes everything to a queue named like the exchange
    pub bindings: Vec<Binding>,
    /// Apply embedded migrations on startup
    pub migrate: bool,
    pub poller: PollerConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::Memory,
            url: None,
            exchange: "notifications".to_string(),
            bindings: Vec::new(),
            migrate: true,
            poller: PollerConfig::default(),
        }
    }
}

impl BusConfig {
    /// Apply `BUS_KIND`, `BUS_URL` (falling back to `DATABASE_URL`),
    /// `BUS_EXCHANGE` and `BUS_POLL_INTERVAL_MS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(kind) = env_string("BUS_KIND") {
            self.kind = kind.parse()?;
        }
        if let Some(url) = env_string("BUS_URL") {
            self.url = Some(url);
        } else if self.url.is_none() {
            self.url = env_string("DATABASE_URL");
        }
        if let Some(exchange) = env_string("BUS_EXCHANGE") {
            self.exchange = exchange;
        }
        if let Some(millis) = env_parse::<u64>("BUS_POLL_INTERVAL_MS")? {
            self.poller.min_interval = std::time::Duration::from_millis(millis);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.trim().is_empty() {
            return Err(ConfigError::Invalid("bus.exchange must not be empty".to_string()));
        }
        if self.kind == BusKind::Postgres && self.url.is_none() {
            return Err(ConfigError::Invalid(
                "bus.url (BUS_URL or DATABASE_URL) is required for the postgres bus".to_string(),
            ));
        }
        self.poller.validate()?;
        if let Some(binding) = self
            .bindings
            .iter()
            .find(|b| b.queue.trim().is_empty() || b.pattern.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "bus binding needs a queue and a pattern: {binding:?}"
            )));
        }
        Ok(())
    }

    /// Bindings in effect, applying the catch-all default.
    pub fn effective_bindings(&self) -> Vec<Binding> {
        if self.bindings.is_empty() {
            vec![Binding::new(self.exchange.clone(), "#")]
        } else {
            self.bindings.clone()
        }
    }

    /// Same backend bound to another exchange with default bindings.
    pub fn for_exchange(&self, exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            bindings: Vec::new(),
            ..self.clone()
        }
    }
}

/// Build the channel described by `config`, running migrations if asked.
pub async fn build_channel(
    config: &BusConfig,
) -> Result<Arc<dyn NotificationChannel>, ChannelError> {
    let bindings = config.effective_bindings();
    match (config.kind, config.url.as_deref()) {
        (BusKind::Postgres, Some(url)) => {
            let channel =
                PostgresChannel::connect(url, config.exchange.clone(), bindings, config.poller.clone())
                    .await?;
            if config.migrate {
                channel.migrate().await?;
            }
            info!(exchange = %config.exchange, "Using PostgreSQL notification bus");
            Ok(Arc::new(channel))
        }
        (BusKind::Postgres, None) => Err(ChannelError::Backend(
            "postgres bus requires a database url".to_string(),
        )),
        (BusKind::Memory, _) => {
            info!(exchange = %config.exchange, "Using in-memory notification bus (dev mode)");
            Ok(Arc::new(InMemoryChannel::new(config.exchange.clone(), bindings)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_default_binding_routes_everything_to_exchange_queue() {
        let config = BusConfig::default();
        assert_eq!(
            config.effective_bindings(),
            vec![Binding::new("notifications", "#")]
        );
    }

    #[test]
    fn test_for_exchange_resets_bindings() {
        let config = BusConfig {
            bindings: vec![Binding::new("custom", "vip.*")],
            ..BusConfig::default()
        };
        let status = config.for_exchange("notification_status");
        assert_eq!(status.exchange, "notification_status");
        assert_eq!(
            status.effective_bindings(),
            vec![Binding::new("notification_status", "#")]
        );
        assert_eq!(status.kind, config.kind);
    }

    #[test]
    fn test_config_from_yaml() {
        let config: BusConfig = calendar_core::config::parse_yaml(
            r##"
kind: postgres
url: postgres://db/calendar
exchange: reminders
bindings:
  - queue: email
    pattern: "#"
  - queue: vip
    pattern: "vip.*"
poller:
  min_interval: 50
"##,
        )
        .unwrap();
        assert_eq!(config.kind, BusKind::Postgres);
        assert_eq!(config.exchange, "reminders");
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.poller.min_interval, std::time::Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = BusConfig {
            kind: BusKind::Postgres,
            url: None,
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BusConfig {
            bindings: vec![Binding::new("", "#")],
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = BusConfig::default();
        config.poller.backoff_multiplier = -2.0;
        assert!(config.validate().is_err());

        assert!("kafka".parse::<BusKind>().is_err());
        assert!(BusConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_build_memory_channel() {
        let channel = build_channel(&BusConfig::default()).await.unwrap();
        channel.publish("u1", b"hello".to_vec()).await.unwrap();

        let mut stream = channel.consume("notifications").await.unwrap();
        assert_eq!(stream.next().await, Some(b"hello".to_vec()));
    }
}
