use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;

const QUEUE_DEPTH_GAUGE: &str = "aggregator_queue_depth";

/// Returned by `enqueue` once the consumer side is gone. Hands the event back.
#[derive(Error, Debug)]
#[error("ingestion queue is closed")]
pub struct QueueClosed(pub Event);

enum Tx {
    Bounded(mpsc::Sender<Event>),
    Unbounded(mpsc::UnboundedSender<Event>),
}

impl Clone for Tx {
    fn clone(&self) -> Self {
        match self {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        }
    }
}

enum Rx {
    Bounded(mpsc::Receiver<Event>),
    Unbounded(mpsc::UnboundedReceiver<Event>),
}

/// FIFO handoff between publishers and the single consumer.
///
/// With a capacity the queue is bounded and `enqueue` waits for a free
/// slot (backpressure on the publisher). Without one it never waits.
pub struct IngestQueue;

impl IngestQueue {
    pub fn new(capacity: Option<NonZeroUsize>) -> (QueueSender, QueueReceiver) {
        let depth = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.get());
                (Tx::Bounded(tx), Rx::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Tx::Unbounded(tx), Rx::Unbounded(rx))
            }
        };

        (
            QueueSender {
                tx,
                depth: depth.clone(),
                capacity,
            },
            QueueReceiver {
                rx,
                depth,
                closed: false,
            },
        )
    }
}

#[derive(Clone)]
pub struct QueueSender {
    tx: Tx,
    depth: Arc<AtomicUsize>,
    capacity: Option<NonZeroUsize>,
}

impl QueueSender {
    /// Append an event. Waits while a bounded queue is full.
    pub async fn enqueue(&self, event: Event) -> Result<(), QueueClosed> {
        match &self.tx {
            Tx::Bounded(tx) => {
                let Ok(permit) = tx.reserve().await else {
                    return Err(QueueClosed(event));
                };
                // Counted before the send so the receiver never sees depth underflow.
                self.increment_depth();
                permit.send(event);
            }
            Tx::Unbounded(tx) => {
                self.increment_depth();
                if let Err(mpsc::error::SendError(event)) = tx.send(event) {
                    self.depth.fetch_sub(1, Ordering::AcqRel);
                    return Err(QueueClosed(event));
                }
            }
        }

        Ok(())
    }

    /// Number of events enqueued and not yet dequeued.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }

    fn increment_depth(&self) {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!(QUEUE_DEPTH_GAUGE).set(depth as f64);
    }
}

pub struct QueueReceiver {
    rx: Rx,
    depth: Arc<AtomicUsize>,
    closed: bool,
}

impl QueueReceiver {
    /// Refuse further enqueues. Events already buffered can still be
    /// dequeued, after which `dequeue` returns `None`.
    pub fn close(&mut self) {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.close(),
            Rx::Unbounded(rx) => rx.close(),
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next event. Returns `None` once every sender is dropped
    /// and the buffer is drained. Cancel safe: dropping the future loses nothing.
    pub async fn dequeue(&mut self) -> Option<Event> {
        let event = match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }?;

        let depth = self.depth.fetch_sub(1, Ordering::AcqRel) - 1;
        gauge!(QUEUE_DEPTH_GAUGE).set(depth as f64);

        Some(event)
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}
