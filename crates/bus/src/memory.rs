//! In-memory NotificationChannel for dev mode and tests
//!
//! Each bound queue is an unbounded tokio mpsc buffer with a single reader.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use calendar_core::{Binding, ChannelError, MessageStream, NotificationChannel};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

struct QueueState {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Taken by the first consumer
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl QueueState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// In-memory topic channel
///
/// Messages published before a consumer attaches are buffered. `close`
/// drops every sender, so consumer streams end after draining what was
/// already buffered.
pub struct InMemoryChannel {
    exchange: String,
    bindings: Vec<Binding>,
    /// None once closed
    queues: Mutex<Option<HashMap<String, QueueState>>>,
}

impl InMemoryChannel {
    pub fn new(exchange: impl Into<String>, bindings: Vec<Binding>) -> Self {
        let queues = bindings
            .iter()
            .map(|b| (b.queue.clone(), QueueState::new()))
            .collect();
        Self {
            exchange: exchange.into(),
            bindings,
            queues: Mutex::new(Some(queues)),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn is_closed(&self) -> bool {
        self.queues.lock().is_none()
    }
}

/// Distinct queues bound to `routing_key`, in name order.
pub(crate) fn route<'a>(bindings: &'a [Binding], routing_key: &str) -> BTreeSet<&'a str> {
    bindings
        .iter()
        .filter(|b| b.matches(routing_key))
        .map(|b| b.queue.as_str())
        .collect()
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), ChannelError> {
        let guard = self.queues.lock();
        let queues = guard.as_ref().ok_or(ChannelError::Closed)?;

        let targets = route(&self.bindings, routing_key);
        if targets.is_empty() {
            debug!(exchange = %self.exchange, routing_key, "Unroutable message dropped");
            return Ok(());
        }

        for queue in targets {
            if let Some(state) = queues.get(queue) {
                if state.tx.send(body.clone()).is_err() {
                    debug!(queue, "Consumer gone, message dropped");
                }
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<MessageStream, ChannelError> {
        let mut guard = self.queues.lock();
        let queues = guard.as_mut().ok_or(ChannelError::Closed)?;
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| ChannelError::UnknownQueue(queue.to_string()))?;
        let rx = state
            .rx
            .take()
            .ok_or_else(|| ChannelError::AlreadyConsuming(queue.to_string()))?;

        debug!(queue, "Consumer attached");
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.queues.lock().take().is_some() {
            debug!(exchange = %self.exchange, "In-memory channel closed");
        }
        Ok(())
    }
}
