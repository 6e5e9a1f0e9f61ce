use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::event::Event;
use crate::queue::QueueReceiver;
use crate::stats::Stats;
use crate::store::{DedupStore, InsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Stopped,
}

/// The single reader of the ingestion queue. Applies dedup through the
/// store and records each outcome in the stats.
pub struct Consumer {
    queue: QueueReceiver,
    store: Arc<dyn DedupStore + Send + Sync>,
    stats: Arc<Stats>,
    shutdown: CancellationToken,
    drain: CancellationToken,
    running: Arc<AtomicBool>,
}

impl Consumer {
    pub fn new(
        queue: QueueReceiver,
        store: Arc<dyn DedupStore + Send + Sync>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            queue,
            store,
            stats,
            shutdown: CancellationToken::new(),
            drain: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Run the loop on its own tokio task.
    pub fn spawn(self) -> ConsumerHandle {
        let shutdown = self.shutdown.clone();
        let drain = self.drain.clone();
        let status = ConsumerStatus {
            running: self.running.clone(),
        };
        let task = tokio::spawn(self.run());

        ConsumerHandle {
            shutdown,
            drain,
            status,
            task,
        }
    }

    /// Process events until a stop is requested or the queue is closed and
    /// empty.
    ///
    /// A stop request only interrupts a pending dequeue; an insert that is
    /// already running completes and is counted before the loop exits. A
    /// drain request closes the queue and keeps going until it is empty.
    pub async fn run(mut self) {
        info!("consumer started and waiting for events");

        loop {
            let event = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(pending = self.queue.depth(), "stop requested, leaving consumer loop");
                    break;
                }
                _ = self.drain.cancelled(), if !self.queue.is_closed() => {
                    info!(pending = self.queue.depth(), "drain requested, closing ingestion queue");
                    self.queue.close();
                    continue;
                }
                event = self.queue.dequeue() => match event {
                    Some(event) => event,
                    None => {
                        info!("ingestion queue closed, leaving consumer loop");
                        break;
                    }
                },
            };

            self.process(event).await;

            // Give publishers and readers sharing this runtime a turn.
            tokio::task::yield_now().await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("consumer stopped");
    }

    async fn process(&self, event: Event) {
        let start = Instant::now();
        let result = self.store.insert(&event).await;
        histogram!("aggregator_store_insert_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(InsertOutcome::Inserted) => {
                self.stats.record_unique();
                info!(topic = %event.topic, event_id = %event.event_id, "processed event");
            }
            Ok(InsertOutcome::Duplicate) => {
                self.stats.record_duplicate();
                info!(topic = %event.topic, event_id = %event.event_id, "dropped duplicate event");
            }
            Err(err) => {
                // Dropped for this pass, the loop carries on with the next event.
                self.stats.record_store_error();
                error!(
                    topic = %event.topic,
                    event_id = %event.event_id,
                    error = %err,
                    "failed to persist event"
                );
            }
        }
    }
}

/// Cheap, cloneable view on whether the consumer loop is still running.
#[derive(Clone)]
pub struct ConsumerStatus {
    running: Arc<AtomicBool>,
}

impl ConsumerStatus {
    pub fn state(&self) -> ConsumerState {
        match self.running.load(Ordering::SeqCst) {
            true => ConsumerState::Running,
            false => ConsumerState::Stopped,
        }
    }
}

pub struct ConsumerHandle {
    shutdown: CancellationToken,
    drain: CancellationToken,
    status: ConsumerStatus,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        self.status.state()
    }

    pub fn status(&self) -> ConsumerStatus {
        self.status.clone()
    }

    /// Request a stop and wait for the loop to exit.
    pub async fn stop(self) {
        info!("stopping consumer");
        self.shutdown.cancel();
        self.join().await
    }

    /// Close the queue, process every event already buffered, then wait
    /// for the loop to exit. Publishers holding a sender see `QueueClosed`.
    pub async fn drain(self) {
        info!("draining consumer");
        self.drain.cancel();
        self.join().await
    }

    /// Wait for the loop to exit on its own, which happens once the queue is
    /// closed and drained.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("consumer task failed: {}", e);
        }
        self.status.running.store(false, Ordering::SeqCst);
    }
}
