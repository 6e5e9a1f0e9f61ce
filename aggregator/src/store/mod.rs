use async_trait::async_trait;
use thiserror::Error;

use crate::event::Event;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of an insert attempt. A duplicate is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First event seen with this (topic, event_id), a row was created.
    Inserted,
    /// A row with this (topic, event_id) already exists, nothing was written.
    Duplicate,
}

/// Errors raised by a dedup store. None of these mean "duplicate".
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to prepare database directory")]
    Directory(#[source] std::io::Error),
    #[error("connection failed with: {error}")]
    Connection { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    Query {
        command: &'static str,
        error: sqlx::Error,
    },
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored row could not be decoded: {0}")]
    Corrupted(String),
    #[error("store is closed")]
    Closed,
}

/// Durable record of every unique event, keyed by (topic, event_id).
#[async_trait]
pub trait DedupStore {
    /// Persist `event` unless its (topic, event_id) is already stored.
    /// Two concurrent inserts of the same key never both return `Inserted`.
    async fn insert(&self, event: &Event) -> Result<InsertOutcome, StoreError>;

    /// All stored events in insertion order, optionally restricted to one topic.
    async fn list(&self, topic: Option<&str>) -> Result<Vec<Event>, StoreError>;

    /// Release underlying resources. Later calls fail with a `StoreError`.
    async fn close(&self);
}
