// Calendar storage
//
// EventStore backends:
// - InMemoryEventStore: one map behind a parking_lot RwLock (dev mode, tests)
// - PostgresEventStore: sqlx over PostgreSQL with embedded migrations
// - StorageBackend: configuration-driven selection between the two

pub mod backend;
pub mod memory;
pub mod postgres;

pub use backend::{StorageBackend, StorageConfig, StorageKind};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
