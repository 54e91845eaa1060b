//! # Bounded Event Queue
//!
//! Many-producer, single-consumer FIFO between request handling code and the
//! publisher worker. Producers wait when the queue is full; nothing is dropped
//! on enqueue. Once the consumer closes the queue, pending and future enqueues
//! fail immediately instead of waiting forever.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::Event;

pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Errors returned to producers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventQueueError {
    #[error("Event queue is closed; event {event_id} was not accepted")]
    Closed { event_id: Uuid },
}

/// Create a bounded event queue with `capacity` slots
///
/// # Panics
///
/// Panics if `capacity` is zero; configuration validation rejects that value.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer handle; cheap to clone and share across request handlers
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Hand an event to the queue, waiting for a free slot when it is full
    pub async fn enqueue(&self, event: Event) -> Result<(), EventQueueError> {
        self.tx
            .send(event)
            .await
            .map_err(|mpsc::error::SendError(event)| EventQueueError::Closed {
                event_id: event.id(),
            })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots at this instant
    pub fn available_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer handle; owned by exactly one publisher worker
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Next event in arrival order.
    ///
    /// Returns `None` once every sender is gone and the buffer is empty.
    /// Cancel-safe: dropping the future never loses an event.
    pub async fn dequeue(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Events currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the queue and discard whatever is still buffered.
    ///
    /// Consumes the receiver, so a queue can only be closed once. Producers
    /// blocked on a full queue are released with [`EventQueueError::Closed`].
    /// Returns the number of events that were discarded.
    pub fn close(mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventAction;
    use serde_json::json;

    fn event(n: u64) -> Event {
        Event::new(EventAction::Create, format!("user-{n}"), json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = event_queue(8);
        let events: Vec<Event> = (0..5).map(event).collect();
        for e in &events {
            tx.enqueue(e.clone()).await.unwrap();
        }
        for expected in &events {
            assert_eq!(rx.dequeue().await.unwrap().id(), expected.id());
        }
    }

    #[tokio::test]
    async fn test_dequeue_returns_none_when_all_senders_dropped() {
        let (tx, mut rx) = event_queue(2);
        tx.enqueue(event(1)).await.unwrap();
        drop(tx);
        assert!(rx.dequeue().await.is_some());
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_close_fails_fast() {
        let (tx, rx) = event_queue(2);
        tx.enqueue(event(1)).await.unwrap();

        assert_eq!(rx.close(), 1);

        let rejected = event(2);
        let id = rejected.id();
        assert_eq!(
            tx.enqueue(rejected).await,
            Err(EventQueueError::Closed { event_id: id })
        );
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_capacity_reporting() {
        let (tx, _rx) = event_queue(DEFAULT_QUEUE_CAPACITY);
        assert_eq!(tx.max_capacity(), 128);
        tx.enqueue(event(1)).await.unwrap();
        assert_eq!(tx.available_capacity(), 127);
    }
}
