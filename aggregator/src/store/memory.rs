use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::event::{Event, EventKey};
use crate::store::{DedupStore, InsertOutcome, StoreError};

#[derive(Default)]
struct Inner {
    keys: HashSet<EventKey>,
    events: Vec<Event>,
    closed: bool,
}

/// Process-local dedup store. Nothing survives a restart: only meant for
/// local debugging and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn insert(&self, event: &Event) -> Result<InsertOutcome, StoreError> {
        // Key check and row append happen under one write guard.
        let Ok(mut inner) = self.inner.write() else {
            return Err(StoreError::Corrupted("poisoned MemoryStore lock".to_owned()));
        };
        if inner.closed {
            return Err(StoreError::Closed);
        }

        if !inner.keys.insert(event.key()) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.events.push(event.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn list(&self, topic: Option<&str>) -> Result<Vec<Event>, StoreError> {
        let Ok(inner) = self.inner.read() else {
            return Err(StoreError::Corrupted("poisoned MemoryStore lock".to_owned()));
        };
        if inner.closed {
            return Err(StoreError::Closed);
        }

        Ok(inner
            .events
            .iter()
            .filter(|event| topic.map_or(true, |topic| event.topic == topic))
            .cloned()
            .collect())
    }

    async fn close(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.closed = true;
        }
    }
}
