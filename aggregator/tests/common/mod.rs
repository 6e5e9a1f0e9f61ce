#![allow(dead_code)]

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Once};
use std::time::Duration;

use aggregator::config::Config;
use aggregator::event::Event;
use aggregator::stats::Stats;
use aggregator::store::SqliteStore;
use aggregator::time::TimeSource;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Map};
use tempfile::TempDir;
use tokio::time::timeout;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
    dedup_db: "./data/dedup.db".to_string(),
    memory_store: true,
    queue_capacity: None,
    max_db_connections: 5,
    export_prometheus: false,
});

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

#[derive(Clone)]
pub struct FixedTime {
    pub time: DateTime<Utc>,
}

impl Default for FixedTime {
    fn default() -> Self {
        Self {
            time: Utc.with_ymd_and_hms(2025, 10, 23, 10, 0, 0).unwrap(),
        }
    }
}

impl TimeSource for FixedTime {
    fn current_time(&self) -> DateTime<Utc> {
        self.time
    }
}

pub fn event(topic: &str, event_id: &str) -> Event {
    Event {
        topic: topic.to_string(),
        event_id: event_id.to_string(),
        timestamp: Utc::now(),
        source: "integration".to_string(),
        payload: Map::from_iter([("id".to_string(), json!(event_id))]),
    }
}

pub async fn open_sqlite(dir: &TempDir) -> Arc<SqliteStore> {
    let path = dir.path().join("dedup.db");
    let store = SqliteStore::open(path.to_str().unwrap(), 5)
        .await
        .expect("failed to open sqlite store");
    Arc::new(store)
}

/// Wait until every received event has an outcome.
pub async fn wait_for_quiescence(stats: &Stats) {
    timeout(Duration::from_secs(10), async {
        while stats.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline did not settle in time");
}
