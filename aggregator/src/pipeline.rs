use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::info;

use crate::consumer::{Consumer, ConsumerHandle, ConsumerStatus};
use crate::gateway::PublishGateway;
use crate::queue::IngestQueue;
use crate::stats::Stats;
use crate::store::DedupStore;

/// A running gateway -> queue -> consumer -> store chain.
pub struct Pipeline {
    pub gateway: PublishGateway,
    pub stats: Arc<Stats>,
    pub store: Arc<dyn DedupStore + Send + Sync>,
    consumer: ConsumerHandle,
}

impl Pipeline {
    /// Wire the pieces together and start the consumer.
    pub fn start(
        store: Arc<dyn DedupStore + Send + Sync>,
        queue_capacity: Option<NonZeroUsize>,
    ) -> Self {
        let (sender, receiver) = IngestQueue::new(queue_capacity);
        let stats = Arc::new(Stats::new());

        let consumer = Consumer::new(receiver, store.clone(), stats.clone()).spawn();

        info!(capacity = ?sender.capacity(), "pipeline started");

        Self {
            gateway: PublishGateway::new(sender, stats.clone()),
            stats,
            store,
            consumer,
        }
    }

    pub fn consumer_status(&self) -> ConsumerStatus {
        self.consumer.status()
    }

    /// Stop the consumer without draining, then release the store.
    /// Events still queued are discarded.
    pub async fn shutdown(self) {
        let pending = self.gateway.queue_depth();
        self.consumer.stop().await;
        self.store.close().await;
        info!(discarded = pending, "pipeline shut down");
    }

    /// Close the queue, let the consumer process everything already
    /// accepted, then release the store. Gateway clones held elsewhere
    /// (the router state, for one) get `QueueClosed` from then on.
    pub async fn drain(self) {
        self.consumer.drain().await;
        self.store.close().await;
        info!("pipeline drained");
    }
}
