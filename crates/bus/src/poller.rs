//! Queue polling with exponential backoff
//!
//! Claims messages from the bus_messages table. The interval resets to the
//! minimum whenever messages are found and grows towards the maximum while
//! the queue is idle.

use std::time::Duration;

use calendar_core::ConfigError;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    /// Minimum poll interval (when messages are available)
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval (when idle)
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier when no messages found
    pub backoff_multiplier: f64,

    /// Maximum messages to claim per poll
    pub batch_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            batch_size: 10,
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Check values that bypassed the builder clamps, e.g. from a config file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval.is_zero() || self.max_interval < self.min_interval {
            return Err(ConfigError::Invalid(
                "bus.poller intervals must be positive with min <= max".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "bus.poller.backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "bus.poller.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Claims messages of one queue with adaptive backoff
pub struct QueuePoller {
    pool: PgPool,
    queue: String,
    config: PollerConfig,
    current_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl QueuePoller {
    pub fn new(
        pool: PgPool,
        queue: String,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            queue,
            current_interval: config.min_interval,
            config,
            shutdown_rx,
        }
    }

    /// Claim and remove up to `batch_size` messages, oldest first.
    ///
    /// Concurrent pollers of the same queue skip each other's locked rows.
    #[instrument(skip(self), fields(queue = %self.queue))]
    pub async fn poll(&mut self) -> Result<Vec<Vec<u8>>, sqlx::Error> {
        if *self.shutdown_rx.borrow() {
            debug!("Poller shutdown requested");
            return Ok(vec![]);
        }

        let batch_size = i64::try_from(self.config.batch_size).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            DELETE FROM bus_messages
            WHERE id IN (
                SELECT id FROM bus_messages
                WHERE queue = $1
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body
            "#,
        )
        .bind(&self.queue)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(|row| Ok((row.try_get::<i64, _>("id")?, row.try_get::<Vec<u8>, _>("body")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        // RETURNING does not preserve the subquery order
        messages.sort_by_key(|(id, _)| *id);

        if messages.is_empty() {
            self.increase_backoff();
            trace!(
                interval_ms = self.current_interval.as_millis(),
                "No messages found, backing off"
            );
        } else {
            self.reset_backoff();
            debug!(count = messages.len(), "Claimed messages");
        }

        Ok(messages.into_iter().map(|(_, body)| body).collect())
    }

    /// Wait for the current backoff interval
    ///
    /// Returns true if shutdown is signaled.
    pub async fn wait(&mut self) -> bool {
        if *self.shutdown_rx.borrow() {
            return true;
        }
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.current_interval) => false,
            _ = shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        }
    }

    /// Record a failed poll
    pub fn on_error(&mut self) {
        self.increase_backoff();
    }

    fn reset_backoff(&mut self) {
        self.current_interval = self.config.min_interval;
    }

    fn increase_backoff(&mut self) {
        self.current_interval = next_interval(self.current_interval, &self.config);
    }
}

/// Interval after an idle poll, kept within `[min_interval, max_interval]`.
pub fn next_interval(current: Duration, config: &PollerConfig) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_interval)
        .max(config.min_interval)
        .min(config.max_interval)
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(100));
        assert_eq!(config.max_interval, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_config_builder_clamps() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(50))
            .with_max_interval(Duration::from_secs(10))
            .with_backoff_multiplier(0.5)
            .with_batch_size(0);

        assert_eq!(config.min_interval, Duration::from_millis(50));
        assert_eq!(config.max_interval, Duration::from_secs(10));
        assert_eq!(config.backoff_multiplier, 1.0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_backoff_grows_to_max() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(300))
            .with_backoff_multiplier(2.0);

        let mut interval = config.min_interval;
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_millis(200));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_millis(300));
        interval = next_interval(interval, &config);
        assert_eq!(interval, Duration::from_millis(300));
    }

    #[test]
    fn test_next_interval_survives_bad_multiplier() {
        for multiplier in [-2.0, 1e30, f64::NAN, f64::INFINITY, 0.5] {
            let config = PollerConfig {
                backoff_multiplier: multiplier,
                ..PollerConfig::default()
            };
            let interval = next_interval(Duration::from_secs(1), &config);
            assert!(
                interval >= config.min_interval && interval <= config.max_interval,
                "multiplier {multiplier} gave {interval:?}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_values_from_yaml() {
        for yaml in [
            "backoff_multiplier: -2.0",
            "backoff_multiplier: 0.5",
            "backoff_multiplier: .nan",
            "batch_size: 0",
            "min_interval: 0",
            "min_interval: 500\nmax_interval: 100",
        ] {
            let config: PollerConfig = calendar_core::config::parse_yaml(yaml).unwrap();
            assert!(config.validate().is_err(), "{yaml}");
        }
        assert!(PollerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml_millis() {
        let config: PollerConfig = calendar_core::config::parse_yaml(
            "min_interval: 250\nmax_interval: 2000\n",
        )
        .unwrap();
        assert_eq!(config.min_interval, Duration::from_millis(250));
        assert_eq!(config.max_interval, Duration::from_secs(2));
        assert_eq!(config.batch_size, 10);
    }
}
