use std::num::NonZeroUsize;
use std::sync::Arc;

use aggregator::pipeline::Pipeline;
use aggregator::store::{DedupStore, MemoryStore};
use tempfile::TempDir;

mod common;
use common::*;

#[tokio::test]
async fn republished_event_is_stored_once() {
    setup_tracing();
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::start(open_sqlite(&dir).await, None);

    pipeline.gateway.publish(vec![event("t", "1")]).await.unwrap();
    pipeline.gateway.publish(vec![event("t", "1")]).await.unwrap();
    wait_for_quiescence(&pipeline.stats).await;

    let stored = pipeline.store.list(Some("t")).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_id, "1");

    let snapshot = pipeline.stats.snapshot();
    assert_eq!(snapshot.received, 2);
    assert_eq!(snapshot.unique_processed, 1);
    assert_eq!(snapshot.duplicate_dropped, 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn batch_is_accepted_and_stored() {
    setup_tracing();
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::start(open_sqlite(&dir).await, None);

    let accepted = pipeline
        .gateway
        .publish(vec![event("multi", "0"), event("multi", "1"), event("multi", "2")])
        .await
        .unwrap();
    assert_eq!(accepted, 3);
    wait_for_quiescence(&pipeline.stats).await;

    let ids: Vec<String> = pipeline
        .store
        .list(Some("multi"))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, vec!["0", "1", "2"]);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn topic_is_visible_before_processing() {
    setup_tracing();
    // Reported as soon as publish returns, whether or not the consumer got to it.
    let pipeline = Pipeline::start(Arc::new(MemoryStore::new()), NonZeroUsize::new(4));

    pipeline
        .gateway
        .publish(vec![event("fresh", "1")])
        .await
        .unwrap();

    assert!(pipeline.stats.has_topic("fresh"));
    assert!(pipeline.stats.snapshot().topics.contains(&"fresh".to_string()));

    pipeline.drain().await;
}

#[tokio::test]
async fn counters_are_conserved_under_concurrent_publishers() {
    setup_tracing();
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::start(open_sqlite(&dir).await, NonZeroUsize::new(8));

    let publishers: Vec<_> = (0..4)
        .map(|worker| {
            let gateway = pipeline.gateway.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    // Every worker publishes the same 25 ids twice over.
                    let id = (i % 25).to_string();
                    let topic = format!("topic-{}", worker % 2);
                    gateway.publish(vec![event(&topic, &id)]).await.unwrap();
                }
            })
        })
        .collect();

    for publisher in publishers {
        publisher.await.unwrap();
    }
    wait_for_quiescence(&pipeline.stats).await;

    let snapshot = pipeline.stats.snapshot();
    assert_eq!(snapshot.received, 200);
    assert_eq!(snapshot.unique_processed, 50);
    assert_eq!(snapshot.duplicate_dropped, 150);
    assert_eq!(snapshot.topics, vec!["topic-0", "topic-1"]);
    assert_eq!(pipeline.store.list(None).await.unwrap().len(), 50);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn dedup_state_survives_restart() {
    setup_tracing();
    let dir = TempDir::new().unwrap();

    let first = Pipeline::start(open_sqlite(&dir).await, None);
    first.gateway.publish(vec![event("t", "persisted")]).await.unwrap();
    first.drain().await;

    let second = Pipeline::start(open_sqlite(&dir).await, None);
    second
        .gateway
        .publish(vec![event("t", "persisted"), event("t", "new")])
        .await
        .unwrap();
    wait_for_quiescence(&second.stats).await;

    assert_eq!(second.stats.unique_processed(), 1);
    assert_eq!(second.stats.duplicate_dropped(), 1);
    assert_eq!(second.store.list(Some("t")).await.unwrap().len(), 2);

    second.shutdown().await;
}

#[tokio::test]
async fn publish_fails_once_the_consumer_is_gone() {
    setup_tracing();
    let pipeline = Pipeline::start(Arc::new(MemoryStore::new()), None);
    let gateway = pipeline.gateway.clone();
    let stats = pipeline.stats.clone();

    pipeline.shutdown().await;

    assert!(gateway.publish(vec![event("late", "1")]).await.is_err());
    assert_eq!(stats.received(), 0);
    assert!(!stats.has_topic("late"));
}
