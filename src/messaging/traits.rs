//! # Broker Capability Traits
//!
//! One trait per role the event pipeline needs from a broker. Providers
//! implement them for a real RabbitMQ connection or for the in-memory broker
//! used in tests.
//!
//! Publisher and consumer handles take `&mut self`: each is owned by exactly one
//! worker task, and broker channels are not shared between tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::topology::Topology;
use super::MessagingError;
use crate::events::Event;

/// Declares exchanges, queues and bindings
#[async_trait]
pub trait TopologyDeclarer: Send + Sync {
    /// Declare the durable exchange, the durable queue and every binding.
    ///
    /// Must succeed when called again with an identical descriptor.
    async fn declare(&self, topology: &Topology) -> Result<(), MessagingError>;
}

/// Publishes messages on a channel owned by the publisher worker
#[async_trait]
pub trait BrokerPublisher: Send + 'static {
    async fn publish(&mut self, message: OutboundMessage) -> Result<(), MessagingError>;

    /// Release the publish channel
    async fn close(&mut self) -> Result<(), MessagingError>;
}

/// Receives deliveries on a channel owned by the consumer worker
#[async_trait]
pub trait BrokerConsumer: Send + 'static {
    /// Limit outstanding deliveries to `prefetch` and start an auto-acknowledged
    /// subscription on `queue`
    async fn subscribe(&mut self, queue: &str, prefetch: u16) -> Result<(), MessagingError>;

    /// Next delivery, or `None` once the broker has closed the subscription.
    ///
    /// Must be cancel-safe so it can be raced against shutdown.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, MessagingError>>;

    /// Release the consume channel
    async fn close(&mut self) -> Result<(), MessagingError>;
}

/// Owns the broker connection and hands out per-role handles
#[async_trait]
pub trait MessageBroker: TopologyDeclarer + 'static {
    type Publisher: BrokerPublisher;
    type Consumer: BrokerConsumer + TopologyDeclarer;

    async fn publisher(&self) -> Result<Self::Publisher, MessagingError>;

    async fn consumer(&self) -> Result<Self::Consumer, MessagingError>;

    async fn close(&self) -> Result<(), MessagingError>;

    fn provider_name(&self) -> &'static str;
}

/// Message metadata attached to every publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: String,
    pub persistent: bool,
    pub message_id: String,
    /// Message type token; the event's routing key
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// A fully-formed message ready to hand to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

impl OutboundMessage {
    /// Persistent JSON message for `event`, routed by its action
    pub fn from_event(exchange: impl Into<String>, event: &Event) -> Result<Self, MessagingError> {
        Ok(Self {
            exchange: exchange.into(),
            routing_key: event.routing_key().to_string(),
            body: event.to_bytes()?,
            properties: MessageProperties {
                content_type: "application/json".to_string(),
                persistent: true,
                message_id: event.id().to_string(),
                kind: event.routing_key().to_string(),
                timestamp: event.timestamp(),
            },
        })
    }
}

/// A message handed to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub message_id: Option<String>,
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
            message_id: None,
            redelivered: false,
        }
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventAction;
    use serde_json::json;

    #[test]
    fn test_outbound_message_from_event() {
        let event = Event::new(EventAction::Update, "user-7", json!({"name": "Ada"}));
        let message = OutboundMessage::from_event("users", &event).unwrap();

        assert_eq!(message.exchange, "users");
        assert_eq!(message.routing_key, "PUT");
        assert_eq!(message.properties.content_type, "application/json");
        assert!(message.properties.persistent);
        assert_eq!(message.properties.message_id, event.id().to_string());
        assert_eq!(message.properties.kind, "PUT");
        assert_eq!(message.properties.timestamp, event.timestamp());
        assert_eq!(message.body, event.to_bytes().unwrap());
    }
}
