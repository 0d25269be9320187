// Calendar sender
//
// Consumes notifications published by the scheduler and acknowledges each
// one with a delivery status.

pub mod config;
pub mod sender;

pub use config::{SenderConfig, Settings};
pub use sender::{Sender, SenderError, SenderReport};
