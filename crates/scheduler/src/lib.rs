// Calendar scheduler
//
// Periodically publishes notifications for due events and purges events
// past the retention period.

pub mod config;
pub mod scheduler;

pub use config::{SchedulerConfig, Settings};
pub use scheduler::{Scheduler, SchedulerStatus, TickReport};
