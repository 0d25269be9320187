// NotificationChannel capability
//
// A topic bus: a channel publishes to one exchange, and each binding
// attaches a queue to that exchange with a routing pattern. Routing follows
// AMQP topic exchanges: words are dot separated, `*` matches exactly one
// word and `#` matches zero or more words.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of raw message bodies delivered to a single consumer.
pub type MessageStream = BoxStream<'static, Vec<u8>>;

/// Error type for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    /// Only one reader may consume a queue at a time
    #[error("queue {0} already has a consumer")]
    AlreadyConsuming(String),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("bus backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Attaches `queue` to the channel's exchange for keys matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub queue: String,
    pub pattern: String,
}

impl Binding {
    pub fn new(queue: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            pattern: pattern.into(),
        }
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        topic_matches(&self.pattern, routing_key)
    }
}

/// Publish/consume bus used between the scheduler and the sender.
///
/// Delivery is at-least-once with no ordering guarantee across routing keys.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Route `body` to every bound queue whose pattern matches `routing_key`.
    ///
    /// Returns once the bus accepted the message. Unroutable messages are
    /// dropped without error.
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), ChannelError>;

    /// Start consuming `queue`. The stream ends when the channel is closed.
    async fn consume(&self, queue: &str) -> Result<MessageStream, ChannelError>;

    /// Stop all consumers and release backend resources.
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Whether `routing_key` matches the topic `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("user-1", "user-1"));
        assert!(!topic_matches("user-1", "user-2"));
        assert!(topic_matches("notification_status", "notification_status"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(topic_matches("users.*", "users.u1"));
        assert!(!topic_matches("users.*", "users"));
        assert!(!topic_matches("users.*", "users.u1.extra"));
        assert!(topic_matches("*", "u1"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "u1"));
        assert!(topic_matches("#", "a.b.c"));
        assert!(topic_matches("users.#", "users"));
        assert!(topic_matches("users.#", "users.u1.x"));
        assert!(topic_matches("#.status", "delivery.status"));
        assert!(topic_matches("a.#.z", "a.z"));
        assert!(topic_matches("a.#.z", "a.b.c.z"));
        assert!(!topic_matches("a.#.z", "a.b.c"));
    }

    #[test]
    fn test_binding_matches() {
        let binding = Binding::new("notifications", "#");
        assert!(binding.matches("any.user"));
        let binding = Binding::new("statuses", "notification_status");
        assert!(!binding.matches("u1"));
    }
}
