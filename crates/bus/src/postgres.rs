//! PostgreSQL-backed NotificationChannel
//!
//! Publishing inserts one bus_messages row per bound queue that matches the
//! routing key, in one transaction. Each consumer runs a QueuePoller task
//! that claims rows and forwards their bodies in id order.

use std::collections::HashSet;

use async_trait::async_trait;
use calendar_core::{Binding, ChannelError, MessageStream, NotificationChannel};
use futures::StreamExt;
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

use crate::memory::route;
use crate::poller::{PollerConfig, QueuePoller};

/// PostgreSQL queue-table channel
pub struct PostgresChannel {
    pool: PgPool,
    exchange: String,
    bindings: Vec<Binding>,
    poller: PollerConfig,
    shutdown_tx: watch::Sender<bool>,
    consumers: Mutex<HashSet<String>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PostgresChannel {
    pub fn new(
        pool: PgPool,
        exchange: impl Into<String>,
        bindings: Vec<Binding>,
        poller: PollerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool,
            exchange: exchange.into(),
            bindings,
            poller,
            shutdown_tx,
            consumers: Mutex::new(HashSet::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Open a connection pool to `database_url`
    pub async fn connect(
        database_url: &str,
        exchange: impl Into<String>,
        bindings: Vec<Binding>,
        poller: PollerConfig,
    ) -> Result<Self, ChannelError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL bus: {}", e);
                ChannelError::Backend(e.to_string())
            })?;
        Ok(Self::new(pool, exchange, bindings, poller))
    }

    /// Apply the embedded queue table migrations
    pub async fn migrate(&self) -> Result<(), ChannelError> {
        let mut migrator = sqlx::migrate!("./migrations");
        // The storage crate records its own migrations in the same history table
        migrator.set_ignore_missing(true);
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| ChannelError::Backend(e.to_string()))?;
        info!("Bus migrations applied");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

#[async_trait]
impl NotificationChannel for PostgresChannel {
    #[instrument(skip(self, body), fields(exchange = %self.exchange))]
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let targets: Vec<String> = route(&self.bindings, routing_key)
            .into_iter()
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            debug!("Unroutable message dropped");
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(backend_err)?;
        for queue in &targets {
            sqlx::query(
                r#"
                INSERT INTO bus_messages (exchange, queue, routing_key, body)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&self.exchange)
            .bind(queue)
            .bind(routing_key)
            .bind(&body)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }
        tx.commit().await.map_err(backend_err)?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<MessageStream, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if !self.bindings.iter().any(|b| b.queue == queue) {
            return Err(ChannelError::UnknownQueue(queue.to_string()));
        }
        if !self.consumers.lock().insert(queue.to_string()) {
            return Err(ChannelError::AlreadyConsuming(queue.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.poller.batch_size.max(1));
        let poller = QueuePoller::new(
            self.pool.clone(),
            queue.to_string(),
            self.poller.clone(),
            self.shutdown_tx.subscribe(),
        );
        let handle = tokio::spawn(run_poller(poller, queue.to_string(), tx, self.shutdown_tx.subscribe()));
        self.handles.lock().push(handle);

        info!(queue, "Consumer attached");
        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        if self.shutdown_tx.send_replace(true) {
            return Ok(());
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Queue poller ended abnormally: {}", e);
            }
        }
        self.pool.close().await;
        info!(exchange = %self.exchange, "PostgreSQL channel closed");
        Ok(())
    }
}

/// Forward claimed messages until shutdown or until the consumer goes away.
async fn run_poller(
    mut poller: QueuePoller,
    queue: String,
    tx: mpsc::Sender<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(queue = %queue, "Queue poller started");
    loop {
        match poller.poll().await {
            Ok(messages) => {
                for body in messages {
                    tokio::select! {
                        sent = tx.send(body) => {
                            if sent.is_err() {
                                debug!(queue = %queue, "Consumer dropped, poller stopping");
                                return;
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            debug!(queue = %queue, "Shutdown while forwarding");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Failed to poll queue");
                poller.on_error();
            }
        }

        if poller.wait().await {
            break;
        }
    }
    debug!(queue = %queue, "Queue poller stopped");
}

fn backend_err(e: sqlx::Error) -> ChannelError {
    ChannelError::Backend(e.to_string())
}
