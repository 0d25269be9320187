//! PostgreSQL implementation of EventStore
//!
//! Create and update run in one transaction that first takes a
//! transaction-scoped advisory lock on the owner's user id. Writers of one
//! user are serialized, so the overlap check and the write cannot race.

use async_trait::async_trait;
use calendar_core::{Event, EventStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, info, instrument};

const EVENT_COLUMNS: &str =
    "id, user_id, title, description, start_time, end_time, notify_before";

/// PostgreSQL implementation of EventStore
///
/// # Example
///
/// ```ignore
/// use calendar_storage::PostgresEventStore;
///
/// let store = PostgresEventStore::connect("postgres://localhost/calendar", 10).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                StoreError::Database(e.to_string())
            })?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut migrator = sqlx::migrate!("./migrations");
        // The bus crate records its own migrations in the same history table
        migrator.set_ignore_missing(true);
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Event store migrations applied");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(db_err)
    }

    async fn fetch_events(
        &self,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_event).collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, event), fields(user_id = %event.user_id))]
    async fn create(&self, mut event: Event) -> Result<String, StoreError> {
        if event.id.is_empty() {
            event.id = Event::generate_id();
        }

        let mut tx = self.begin().await?;
        lock_user(&mut tx, &event.user_id).await?;

        let exists = sqlx::query("SELECT 1 FROM events WHERE id = $1")
            .bind(&event.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists(event.id));
        }

        check_overlap(&mut tx, &event).await?;

        sqlx::query(
            r#"
            INSERT INTO events (id, user_id, title, description, start_time, end_time, notify_before)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(i64::from(event.notify_before))
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(event.id.clone())
            }
            _ => {
                error!("Failed to create event: {}", e);
                StoreError::Database(e.to_string())
            }
        })?;

        tx.commit().await.map_err(db_err)?;
        debug!(event_id = %event.id, "Event created");
        Ok(event.id)
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, user_id = %event.user_id))]
    async fn update(&self, event: Event) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        lock_user(&mut tx, &event.user_id).await?;

        let exists = sqlx::query("SELECT 1 FROM events WHERE id = $1 FOR UPDATE")
            .bind(&event.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(event.id));
        }

        check_overlap(&mut tx, &event).await?;

        sqlx::query(
            r#"
            UPDATE events
            SET user_id = $2, title = $3, description = $4, start_time = $5,
                end_time = $6, notify_before = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(i64::from(event.notify_before))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to update event: {}", e);
            StoreError::Database(e.to_string())
        })?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE end_time < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => row_to_event(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY start_time, id");
        self.fetch_events(sqlx::query(&sql)).await
    }

    #[instrument(skip(self))]
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = $1 ORDER BY start_time, id"
        );
        self.fetch_events(sqlx::query(&sql).bind(user_id)).await
    }

    #[instrument(skip(self))]
    async fn list_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE user_id = $1 AND NOT (end_time <= $2 OR start_time >= $3)
            ORDER BY start_time, id
            "#
        );
        self.fetch_events(sqlx::query(&sql).bind(user_id).bind(from).bind(to))
            .await
    }

    #[instrument(skip(self))]
    async fn list_due_before(
        &self,
        now: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE start_time > $1
              AND start_time - make_interval(secs => notify_before) > $1
              AND start_time - make_interval(secs => notify_before) <= $2
            ORDER BY start_time, id
            "#
        );
        self.fetch_events(sqlx::query(&sql).bind(now).bind(before))
            .await
    }
}

/// Serialize writers of `user_id` until the transaction ends.
async fn lock_user(tx: &mut Transaction<'static, Postgres>, user_id: &str) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn check_overlap(
    tx: &mut Transaction<'static, Postgres>,
    event: &Event,
) -> Result<(), StoreError> {
    let conflict: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM events
        WHERE user_id = $1 AND id <> $2 AND start_time < $4 AND $3 < end_time
        ORDER BY start_time, id
        LIMIT 1
        "#,
    )
    .bind(&event.user_id)
    .bind(&event.id)
    .bind(event.start_time)
    .bind(event.end_time)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;

    match conflict {
        Some(conflicting_id) => Err(StoreError::ConflictOverlap {
            id: event.id.clone(),
            conflicting_id,
        }),
        None => Ok(()),
    }
}

fn row_to_event(row: &PgRow) -> Result<Event, StoreError> {
    let notify_before: i64 = row.try_get("notify_before").map_err(db_err)?;
    Ok(Event {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        start_time: row.try_get("start_time").map_err(db_err)?,
        end_time: row.try_get("end_time").map_err(db_err)?,
        notify_before: u32::try_from(notify_before).map_err(|_| {
            StoreError::Serialization(format!("notify_before out of range: {notify_before}"))
        })?,
    })
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
