//! # Consumer Worker
//!
//! Subscribes to the user-events queue and dispatches each delivery to a
//! [`DeliveryHandler`].
//!
//! Prefetch is 1, so deliveries are processed strictly one at a time. The
//! subscription is auto-acknowledged: the broker forgets a message as soon as it
//! is handed over, so a handler failure is logged and never causes redelivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::traits::{BrokerConsumer, Delivery};
use super::MessagingError;
use crate::events::action_label;

/// Outstanding deliveries the broker may push before the worker finishes one
pub const PREFETCH_COUNT: u16 = 1;

/// Side effect applied to every delivery
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> Result<(), MessagingError>;
}

/// Diagnostic line for a delivery: `Action=<label> EventBody=<body>`
pub fn format_delivery(delivery: &Delivery) -> String {
    format!(
        "Action={} EventBody={}",
        action_label(&delivery.routing_key),
        delivery.body_str()
    )
}

/// Default handler: logs the action label and raw body
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeliveryHandler;

#[async_trait]
impl DeliveryHandler for LoggingDeliveryHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), MessagingError> {
        info!(
            routing_key = %delivery.routing_key,
            message_id = delivery.message_id.as_deref(),
            "{}",
            format_delivery(delivery)
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    handler_failures: AtomicU64,
}

impl ConsumerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}

pub struct ConsumerWorker<C, H> {
    consumer: C,
    handler: H,
    queue: String,
    stats: Arc<ConsumerStats>,
}

impl<C, H> std::fmt::Debug for ConsumerWorker<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerWorker")
            .field("queue", &self.queue)
            .field("received", &self.stats.received())
            .field("handler_failures", &self.stats.handler_failures())
            .finish()
    }
}

impl<C, H> ConsumerWorker<C, H>
where
    C: BrokerConsumer,
    H: DeliveryHandler,
{
    /// Apply QoS and start consuming `queue`.
    ///
    /// Errors here are startup-fatal.
    pub async fn subscribe(
        mut consumer: C,
        handler: H,
        queue: impl Into<String>,
    ) -> Result<Self, MessagingError> {
        let queue = queue.into();
        consumer.subscribe(&queue, PREFETCH_COUNT).await?;
        info!(queue = %queue, prefetch = PREFETCH_COUNT, "Consumer subscribed");

        Ok(Self {
            consumer,
            handler,
            queue,
            stats: Arc::new(ConsumerStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Dispatch deliveries until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(queue = %self.queue, "Starting delivery worker");

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,
                next = self.consumer.next_delivery() => match next {
                    Some(Ok(delivery)) => dispatch(&self.handler, &self.stats, delivery).await,
                    Some(Err(e)) => {
                        error!(queue = %self.queue, error = %e, "mq read message error");
                    }
                    None => {
                        warn!(
                            queue = %self.queue,
                            "Broker closed the delivery stream; idling until shutdown"
                        );
                        shutdown.cancelled().await;
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.consumer.close().await {
            warn!(error = %e, "Failed to close consume channel");
        }
        info!(
            received = self.stats.received(),
            handler_failures = self.stats.handler_failures(),
            "Delivery worker gracefully stopped"
        );
    }
}

async fn dispatch<H: DeliveryHandler>(handler: &H, stats: &ConsumerStats, delivery: Delivery) {
    stats.received.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = handler.handle(&delivery).await {
        stats.handler_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            routing_key = %delivery.routing_key,
            error = %e,
            "Delivery handler failed; message already acknowledged and will not be redelivered"
        );
    }
}
