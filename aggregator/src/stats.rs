use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Point-in-time view of the pipeline counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub unique_processed: u64,
    pub duplicate_dropped: u64,
    /// Events whose insert failed. Together with the two outcome counters
    /// this accounts for every received event at quiescence.
    pub store_errors: u64,
    pub topics: Vec<String>,
    pub uptime_seconds: u64,
}

/// Process-wide counters shared by the gateway and the consumer.
///
/// `received` and the topic set are written by the gateway, the outcome
/// counters by the consumer. Each counter is its own atomic, so neither
/// side ever waits on the other.
pub struct Stats {
    received: AtomicU64,
    unique_processed: AtomicU64,
    duplicate_dropped: AtomicU64,
    store_errors: AtomicU64,
    topics: RwLock<BTreeSet<String>>,
    start: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            unique_processed: AtomicU64::new(0),
            duplicate_dropped: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            topics: RwLock::new(BTreeSet::new()),
            start: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
        counter!("aggregator_events_received_total").increment(1);
    }

    /// Undo a `record_received` for an event that never made it into the queue.
    pub fn revert_received(&self) {
        self.received.fetch_sub(1, Ordering::SeqCst);
        counter!("aggregator_events_rejected_total").increment(1);
    }

    pub fn record_topic(&self, topic: &str) {
        if self.has_topic(topic) {
            return;
        }
        match self.topics.write() {
            Ok(mut topics) => {
                topics.insert(topic.to_owned());
            }
            Err(_) => warn!("poisoned Stats topics lock"),
        }
    }

    pub fn record_unique(&self) {
        self.unique_processed.fetch_add(1, Ordering::SeqCst);
        counter!("aggregator_events_persisted_total").increment(1);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_dropped.fetch_add(1, Ordering::SeqCst);
        counter!("aggregator_events_duplicate_total").increment(1);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::SeqCst);
        counter!("aggregator_events_failed_total").increment(1);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn unique_processed(&self) -> u64 {
        self.unique_processed.load(Ordering::SeqCst)
    }

    pub fn duplicate_dropped(&self) -> u64 {
        self.duplicate_dropped.load(Ordering::SeqCst)
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.load(Ordering::SeqCst)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics
            .read()
            .map(|topics| topics.contains(topic))
            .unwrap_or(false)
    }

    /// Events counted as received that have no outcome yet. Zero at quiescence.
    pub fn in_flight(&self) -> u64 {
        let settled = self.settled();
        self.received().saturating_sub(settled)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // Outcome counters are read before `received`: an outcome is only
        // recorded after its event was received, so the snapshot never
        // reports more outcomes than receipts.
        let unique_processed = self.unique_processed();
        let duplicate_dropped = self.duplicate_dropped();
        let store_errors = self.store_errors();
        let received = self.received();

        let topics = match self.topics.read() {
            Ok(topics) => topics.iter().cloned().collect(),
            Err(_) => {
                warn!("poisoned Stats topics lock");
                Vec::new()
            }
        };

        StatsSnapshot {
            received,
            unique_processed,
            duplicate_dropped,
            store_errors,
            topics,
            uptime_seconds: self.uptime_seconds(),
        }
    }

    fn settled(&self) -> u64 {
        self.unique_processed() + self.duplicate_dropped() + self.store_errors()
    }
}
