use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

use crate::event::Event;
use crate::store::{DedupStore, InsertOutcome, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(sqlx::FromRow)]
struct EventRow {
    topic: String,
    event_id: String,
    timestamp: DateTime<Utc>,
    source: String,
    payload: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event, StoreError> {
        let payload: Map<String, Value> = serde_json::from_str(&self.payload).map_err(|e| {
            StoreError::Corrupted(format!(
                "payload of {}:{} is not a JSON object: {}",
                self.topic, self.event_id, e
            ))
        })?;

        Ok(Event {
            topic: self.topic,
            event_id: self.event_id,
            timestamp: self.timestamp,
            source: self.source,
            payload,
        })
    }
}

fn query_error(command: &'static str, error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolClosed => StoreError::Closed,
        error => StoreError::Query { command, error },
    }
}

/// Dedup store backed by a single SQLite table. The (topic, event_id)
/// primary key makes insert-if-absent atomic across connections.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`, creating its parent
    /// directory if needed.
    pub async fn open(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Directory)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|error| StoreError::Connection { error })?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS events (
    topic TEXT NOT NULL,
    event_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (topic, event_id)
)
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|error| query_error("CREATE TABLE", error))?;

        info!(path, "opened sqlite dedup store");

        Ok(Self { pool })
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    #[instrument(skip_all, fields(topic = %event.topic, event_id = %event.event_id))]
    async fn insert(&self, event: &Event) -> Result<InsertOutcome, StoreError> {
        let payload = serde_json::to_string(&event.payload)?;

        // Only the primary key conflict is swallowed; any other constraint
        // failure surfaces as an error.
        let result = sqlx::query(
            r#"
INSERT INTO events
    (topic, event_id, timestamp, source, payload)
VALUES
    (?, ?, ?, ?, ?)
ON CONFLICT (topic, event_id) DO NOTHING
            "#,
        )
        .bind(&event.topic)
        .bind(&event.event_id)
        .bind(event.timestamp)
        .bind(&event.source)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|error| query_error("INSERT", error))?;

        let outcome = match result.rows_affected() {
            0 => InsertOutcome::Duplicate,
            _ => InsertOutcome::Inserted,
        };
        debug!(?outcome, "insert completed");

        Ok(outcome)
    }

    async fn list(&self, topic: Option<&str>) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = match topic {
            Some(topic) => {
                sqlx::query_as(
                    r#"
SELECT topic, event_id, timestamp, source, payload
FROM events
WHERE topic = ?
ORDER BY rowid
                    "#,
                )
                .bind(topic)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
SELECT topic, event_id, timestamp, source, payload
FROM events
ORDER BY rowid
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|error| query_error("SELECT", error))?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("closed sqlite dedup store");
    }
}
