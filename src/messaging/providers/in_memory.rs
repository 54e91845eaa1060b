//! # In-Memory Broker
//!
//! Process-local broker implementing every capability trait, for tests and
//! local development without RabbitMQ.
//!
//! ## Behavior
//!
//! - **Topology**: exchanges, queues and bindings are kept in sets, so repeated
//!   identical declarations are no-ops. Re-declaring an exchange with another type
//!   fails like a broker `PRECONDITION_FAILED`.
//! - **Routing**: direct/topic/headers exchanges match routing keys exactly,
//!   fanout exchanges deliver to every bound queue.
//! - **Auto-ack**: a message counts as acknowledged the moment it is handed to a
//!   subscribed consumer.
//! - **Fault injection**: publishes can be paused (to stall the publisher worker)
//!   or made to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::messaging::topology::{ExchangeType, Topology};
use crate::messaging::traits::{
    BrokerConsumer, BrokerPublisher, Delivery, MessageBroker, OutboundMessage, TopologyDeclarer,
};
use crate::messaging::MessagingError;

#[derive(Debug, Default)]
struct InMemoryQueue {
    /// Messages waiting for a consumer (FIFO order)
    ready: VecDeque<Delivery>,
    /// Active auto-ack subscription
    subscriber: Option<mpsc::UnboundedSender<Delivery>>,
    /// Messages handed to a consumer, and therefore acknowledged
    acked: u64,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeType>,
    queues: HashMap<String, InMemoryQueue>,
    /// (queue, exchange, routing key)
    bindings: HashSet<(String, String, String)>,
    declare_calls: usize,
    published: Vec<OutboundMessage>,
    fail_publishes: bool,
    prefetch: Option<u16>,
}

impl BrokerState {
    fn route(&mut self, message: &OutboundMessage) {
        let fanout = self.exchanges.get(&message.exchange) == Some(&ExchangeType::Fanout);
        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, exchange, key)| {
                *exchange == message.exchange && (fanout || *key == message.routing_key)
            })
            .map(|(queue, _, _)| queue.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        for queue_name in targets {
            let delivery = Delivery {
                routing_key: message.routing_key.clone(),
                body: message.body.clone(),
                message_id: Some(message.properties.message_id.clone()),
                redelivered: false,
            };
            if let Some(queue) = self.queues.get_mut(&queue_name) {
                queue.push(delivery);
            }
        }
    }
}

impl InMemoryQueue {
    fn push(&mut self, delivery: Delivery) {
        match &self.subscriber {
            Some(tx) => match tx.send(delivery) {
                Ok(()) => self.acked += 1,
                Err(mpsc::error::SendError(delivery)) => {
                    self.subscriber = None;
                    self.ready.push_back(delivery);
                }
            },
            None => self.ready.push_back(delivery),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    /// `true` while publishes are stalled
    paused: watch::Sender<bool>,
}

/// In-memory broker; clones share the same state
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                paused,
            }),
        }
    }

    /// Stall every publish until [`resume_publishing`](Self::resume_publishing)
    pub fn pause_publishing(&self) {
        self.shared.paused.send_replace(true);
    }

    pub fn resume_publishing(&self) {
        self.shared.paused.send_replace(false);
    }

    /// Make subsequent publishes fail (`true`) or succeed again (`false`)
    pub fn fail_publishes(&self, fail: bool) {
        self.shared.state.lock().fail_publishes = fail;
    }

    /// Every message accepted so far, in publish order
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.shared.state.lock().published.clone()
    }

    pub fn published_count(&self) -> usize {
        self.shared.state.lock().published.len()
    }

    pub fn declare_calls(&self) -> usize {
        self.shared.state.lock().declare_calls
    }

    pub fn binding_count(&self) -> usize {
        self.shared.state.lock().bindings.len()
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        self.shared.state.lock().bindings.contains(&(
            queue.to_string(),
            exchange.to_string(),
            routing_key.to_string(),
        ))
    }

    /// Messages waiting in `queue` for a consumer
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages the broker considers delivered from `queue`
    pub fn acked_count(&self, queue: &str) -> u64 {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.acked)
            .unwrap_or(0)
    }

    pub fn prefetch(&self) -> Option<u16> {
        self.shared.state.lock().prefetch
    }

    /// Put a message straight onto `queue`, as another producer would
    pub fn inject(&self, queue: &str, delivery: Delivery) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock();
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::delivery(format!("queue '{queue}' not declared")))?;
        queue_state.push(delivery);
        Ok(())
    }

    async fn wait_until_resumed(&self) {
        let mut paused = self.shared.paused.subscribe();
        // The sender lives as long as `self`, so this only ends once resumed
        let _ = paused.wait_for(|paused| !*paused).await;
    }
}

#[async_trait]
impl TopologyDeclarer for InMemoryBroker {
    async fn declare(&self, topology: &Topology) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock();
        state.declare_calls += 1;

        match state.exchanges.get(&topology.exchange) {
            Some(existing) if *existing != topology.exchange_type => {
                return Err(MessagingError::topology(
                    format!("exchange {}", topology.exchange),
                    format!(
                        "PRECONDITION_FAILED - inequivalent arg 'type': received '{}' but current is '{}'",
                        topology.exchange_type, existing
                    ),
                ));
            }
            Some(_) => {}
            None => {
                state
                    .exchanges
                    .insert(topology.exchange.clone(), topology.exchange_type);
            }
        }

        state.queues.entry(topology.queue.clone()).or_default();

        for routing_key in &topology.routing_keys {
            state.bindings.insert((
                topology.queue.clone(),
                topology.exchange.clone(),
                routing_key.clone(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    type Publisher = InMemoryPublisher;
    type Consumer = InMemoryConsumer;

    async fn publisher(&self) -> Result<Self::Publisher, MessagingError> {
        Ok(InMemoryPublisher {
            broker: self.clone(),
            closed: false,
        })
    }

    async fn consumer(&self) -> Result<Self::Consumer, MessagingError> {
        Ok(InMemoryConsumer {
            broker: self.clone(),
            queue: None,
            deliveries: None,
        })
    }

    async fn close(&self) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock();
        for queue in state.queues.values_mut() {
            queue.subscriber = None;
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Publish handle on the in-memory broker
#[derive(Debug)]
pub struct InMemoryPublisher {
    broker: InMemoryBroker,
    closed: bool,
}

#[async_trait]
impl BrokerPublisher for InMemoryPublisher {
    async fn publish(&mut self, message: OutboundMessage) -> Result<(), MessagingError> {
        if self.closed {
            return Err(MessagingError::publish(
                &message.exchange,
                &message.routing_key,
                "channel closed",
            ));
        }

        self.broker.wait_until_resumed().await;

        let mut state = self.broker.shared.state.lock();
        if state.fail_publishes {
            return Err(MessagingError::publish(
                &message.exchange,
                &message.routing_key,
                "broker rejected publish",
            ));
        }
        if !state.exchanges.contains_key(&message.exchange) {
            return Err(MessagingError::publish(
                &message.exchange,
                &message.routing_key,
                format!("NOT_FOUND - no exchange '{}'", message.exchange),
            ));
        }

        state.route(&message);
        state.published.push(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        self.closed = true;
        Ok(())
    }
}

/// Consume handle on the in-memory broker
#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    queue: Option<String>,
    deliveries: Option<mpsc::UnboundedReceiver<Delivery>>,
}

#[async_trait]
impl TopologyDeclarer for InMemoryConsumer {
    async fn declare(&self, topology: &Topology) -> Result<(), MessagingError> {
        self.broker.declare(topology).await
    }
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    async fn subscribe(&mut self, queue: &str, prefetch: u16) -> Result<(), MessagingError> {
        let mut state = self.broker.shared.state.lock();
        state.prefetch = Some(prefetch);

        let queue_state = state.queues.get_mut(queue).ok_or_else(|| {
            MessagingError::consume_setup(queue, format!("NOT_FOUND - no queue '{queue}'"))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        while let Some(delivery) = queue_state.ready.pop_front() {
            if tx.send(delivery).is_ok() {
                queue_state.acked += 1;
            }
        }
        queue_state.subscriber = Some(tx);

        self.queue = Some(queue.to_string());
        self.deliveries = Some(rx);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Result<Delivery, MessagingError>> {
        match self.deliveries.as_mut() {
            Some(rx) => rx.recv().await.map(Ok),
            None => None,
        }
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        if let Some(queue) = self.queue.take() {
            let mut state = self.broker.shared.state.lock();
            if let Some(queue_state) = state.queues.get_mut(&queue) {
                queue_state.subscriber = None;
            }
        }
        self.deliveries = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventAction};
    use serde_json::json;

    fn topology() -> Topology {
        Topology::new("users", ExchangeType::Direct, "users.events")
    }

    #[tokio::test]
    async fn test_routing_to_bound_queue() {
        let broker = InMemoryBroker::new();
        broker.declare(&topology()).await.unwrap();

        let mut publisher = broker.publisher().await.unwrap();
        let event = Event::new(EventAction::Create, "u-1", json!({}));
        publisher
            .publish(OutboundMessage::from_event("users", &event).unwrap())
            .await
            .unwrap();

        assert_eq!(broker.published_count(), 1);
        assert_eq!(broker.queue_depth("users.events"), 1);
    }

    #[tokio::test]
    async fn test_unbound_routing_key_is_dropped_by_exchange() {
        let broker = InMemoryBroker::new();
        broker.declare(&topology()).await.unwrap();

        let mut publisher = broker.publisher().await.unwrap();
        let event = Event::new(EventAction::Create, "u-1", json!({}));
        let mut message = OutboundMessage::from_event("users", &event).unwrap();
        message.routing_key = "PATCH".to_string();
        publisher.publish(message).await.unwrap();

        assert_eq!(broker.published_count(), 1);
        assert_eq!(broker.queue_depth("users.events"), 0);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_exchange_fails() {
        let broker = InMemoryBroker::new();
        let mut publisher = broker.publisher().await.unwrap();
        let event = Event::new(EventAction::Delete, "u-1", json!({}));
        let result = publisher
            .publish(OutboundMessage::from_event("missing", &event).unwrap())
            .await;
        assert!(matches!(result, Err(MessagingError::Publish { .. })));
    }

    #[tokio::test]
    async fn test_subscribe_flushes_ready_messages_and_acks() {
        let broker = InMemoryBroker::new();
        broker.declare(&topology()).await.unwrap();
        broker
            .inject("users.events", Delivery::new("POST", b"{}".to_vec()))
            .unwrap();

        let mut consumer = broker.consumer().await.unwrap();
        consumer.subscribe("users.events", 1).await.unwrap();

        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "POST");
        assert_eq!(broker.acked_count("users.events"), 1);
        assert_eq!(broker.queue_depth("users.events"), 0);
        assert_eq!(broker.prefetch(), Some(1));
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_queue_fails() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer().await.unwrap();
        let result = consumer.subscribe("nope", 1).await;
        assert!(matches!(result, Err(MessagingError::ConsumeSetup { .. })));
    }
}
