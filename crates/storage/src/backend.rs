// Storage backend selection
// Decision: Configuration picks the backend; callers only see Arc<dyn EventStore>
//
// This module provides a StorageBackend enum that can be either PostgreSQL
// (production) or in-memory (dev mode), built from StorageConfig.

use std::str::FromStr;
use std::sync::Arc;

use calendar_core::config::{env_bool, env_parse, env_string};
use calendar_core::{ConfigError, EventStore, StoreError};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::memory::InMemoryEventStore;
use crate::postgres::PostgresEventStore;

/// Which EventStore implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::Invalid(format!("unknown storage kind: {other}"))),
        }
    }
}

/// `storage` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// PostgreSQL connection URL, required for `postgres`
    pub url: Option<String>,
    /// Apply embedded migrations on startup
    pub migrate: bool,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            url: None,
            migrate: true,
            max_connections: 10,
        }
    }
}

impl StorageConfig {
    /// Apply `STORAGE_KIND`, `DATABASE_URL` and `DATABASE_MIGRATE`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(kind) = env_string("STORAGE_KIND") {
            self.kind = kind.parse()?;
        }
        if let Some(url) = env_string("DATABASE_URL") {
            self.url = Some(url);
        }
        if let Some(migrate) = env_bool("DATABASE_MIGRATE")? {
            self.migrate = migrate;
        }
        if let Some(max) = env_parse("DATABASE_MAX_CONNECTIONS")? {
            self.max_connections = max;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == StorageKind::Postgres && self.url.is_none() {
            return Err(ConfigError::Invalid(
                "storage.url (DATABASE_URL) is required for postgres storage".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(PostgresEventStore),
    /// In-memory store (dev mode)
    InMemory(Arc<InMemoryEventStore>),
}

impl StorageBackend {
    /// Build the backend described by `config`, running migrations if asked.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        match (config.kind, config.url.as_deref()) {
            (StorageKind::Postgres, Some(url)) => {
                let store = PostgresEventStore::connect(url, config.max_connections).await?;
                if config.migrate {
                    store.migrate().await?;
                }
                info!("Using PostgreSQL event store");
                Ok(Self::Postgres(store))
            }
            (StorageKind::Postgres, None) => Err(StoreError::Database(
                "postgres storage requires a database url".to_string(),
            )),
            (StorageKind::Memory, _) => {
                info!("Using in-memory event store (dev mode)");
                Ok(Self::in_memory())
            }
        }
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryEventStore::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Short backend name, reported by health checks
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::InMemory(_) => "memory",
        }
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(store) => Some(store.pool()),
            Self::InMemory(_) => None,
        }
    }

    /// The backend as a shareable EventStore
    pub fn store(&self) -> Arc<dyn EventStore> {
        match self {
            Self::Postgres(store) => Arc::new(store.clone()),
            Self::InMemory(store) => store.clone(),
        }
    }
}
