use std::sync::Arc;

use metrics::histogram;
use tracing::{instrument, warn};

use crate::api::AggregatorError;
use crate::event::Event;
use crate::queue::{QueueClosed, QueueSender};
use crate::stats::Stats;

/// Entry point for validated events. Counts and enqueues them; dedup happens
/// later in the consumer, so acceptance says nothing about uniqueness.
#[derive(Clone)]
pub struct PublishGateway {
    queue: QueueSender,
    stats: Arc<Stats>,
}

impl PublishGateway {
    pub fn new(queue: QueueSender, stats: Arc<Stats>) -> Self {
        Self { queue, stats }
    }

    /// Enqueue `events` in order and return how many were accepted.
    ///
    /// Each event is counted as received before it is enqueued, so
    /// `received` never lags behind what the consumer has processed. If the
    /// queue is closed the count for that event is reverted and the rest of
    /// the batch is not enqueued.
    #[instrument(skip_all, fields(batch_size = events.len()))]
    pub async fn publish(&self, events: Vec<Event>) -> Result<usize, AggregatorError> {
        histogram!("aggregator_publish_batch_size").record(events.len() as f64);

        let mut accepted = 0;
        for event in events {
            let topic = event.topic.clone();

            self.stats.record_received();
            if let Err(QueueClosed(event)) = self.queue.enqueue(event).await {
                self.stats.revert_received();
                warn!(
                    topic = %event.topic,
                    event_id = %event.event_id,
                    accepted,
                    "ingestion queue closed, rejecting event"
                );
                return Err(AggregatorError::QueueClosed);
            }
            self.stats.record_topic(&topic);

            accepted += 1;
        }

        Ok(accepted)
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// False once the consumer side of the queue is closed or gone.
    pub fn is_accepting(&self) -> bool {
        !self.queue.is_closed()
    }
}
