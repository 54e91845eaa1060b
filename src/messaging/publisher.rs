//! # Publisher Worker
//!
//! Single task draining the event queue into the broker. It owns the only
//! receiver of the queue and the only publish handle.
//!
//! A failed publish is logged and the event is dropped; nothing is retried or
//! requeued. On shutdown the loop exits at once, abandoning a publish in flight,
//! and events still buffered in the queue are discarded, not flushed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::traits::{BrokerPublisher, OutboundMessage};
use crate::events::{Event, EventReceiver};

/// Upper bound on closing the publish channel at shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Counters shared with whoever needs to observe the worker
#[derive(Debug, Default)]
pub struct PublisherStats {
    published: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl PublisherStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events left in the queue, or interrupted mid-publish, when the worker stopped
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

pub struct PublisherWorker<P> {
    exchange: String,
    receiver: EventReceiver,
    publisher: P,
    stats: Arc<PublisherStats>,
}

impl<P: BrokerPublisher> PublisherWorker<P> {
    pub fn new(exchange: impl Into<String>, receiver: EventReceiver, publisher: P) -> Self {
        Self {
            exchange: exchange.into(),
            receiver,
            publisher,
            stats: Arc::new(PublisherStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Drain the queue until `shutdown` is cancelled or every producer is gone.
    ///
    /// Cancellation also interrupts a publish in flight; that event counts as
    /// discarded.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(exchange = %self.exchange, "Starting publisher worker");

        loop {
            let event = tokio::select! {
                biased;

                () = shutdown.cancelled() => break,
                next = self.receiver.dequeue() => match next {
                    Some(event) => event,
                    None => {
                        warn!("All event producers dropped; publisher worker has nothing left to drain");
                        break;
                    }
                },
            };

            let interrupted = tokio::select! {
                biased;

                () = shutdown.cancelled() => true,
                () = self.publish_event(&event) => false,
            };
            if interrupted {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(event_id = %event.id(), "Publish interrupted by shutdown; event discarded");
                break;
            }
        }

        self.stop().await;
    }

    async fn publish_event(&mut self, event: &Event) {
        let result = match OutboundMessage::from_event(&self.exchange, event) {
            Ok(message) => self.publisher.publish(message).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_id = %event.id(),
                    routing_key = event.routing_key(),
                    subject_id = event.subject_id(),
                    "Event published"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.id(),
                    routing_key = event.routing_key(),
                    error = %e,
                    "mq publish error; event dropped"
                );
            }
        }
    }

    async fn stop(self) {
        let Self {
            receiver,
            mut publisher,
            stats,
            ..
        } = self;

        let discarded = receiver.close();
        if discarded > 0 {
            stats.discarded.fetch_add(discarded as u64, Ordering::Relaxed);
            warn!(discarded, "Buffered events discarded at shutdown");
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, publisher.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close publish channel"),
            Err(_) => warn!(
                timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                "Publish channel did not close in time; abandoning it"
            ),
        }

        info!(
            published = stats.published(),
            failed = stats.failed(),
            discarded = stats.discarded(),
            "Publisher worker gracefully stopped"
        );
    }
}

