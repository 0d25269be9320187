// Calendar notification bus
//
// NotificationChannel backends:
// - InMemoryChannel: per-queue tokio mpsc buffers (dev mode, tests)
// - PostgresChannel: bus_messages queue table with polling consumers
// - build_channel: configuration-driven selection between the two

pub mod config;
pub mod memory;
pub mod poller;
pub mod postgres;

pub use config::{build_channel, BusConfig, BusKind};
pub use memory::InMemoryChannel;
pub use poller::{PollerConfig, QueuePoller};
pub use postgres::PostgresChannel;
