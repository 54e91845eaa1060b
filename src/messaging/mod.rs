//! # Messaging Module
//!
//! Propagates user events to RabbitMQ and consumes them back.
//!
//! - [`topology`]: durable exchange, queue and routing-key bindings
//! - [`publisher`]: worker draining the in-process event queue into the broker
//! - [`consumer`]: worker subscribed to the events queue
//! - [`providers`]: RabbitMQ and in-memory broker implementations

pub mod consumer;
pub mod errors;
pub mod providers;
pub mod publisher;
pub mod topology;
pub mod traits;

pub use consumer::{
    format_delivery, ConsumerStats, ConsumerWorker, DeliveryHandler, LoggingDeliveryHandler,
    PREFETCH_COUNT,
};
pub use errors::{MessagingError, MessagingResult};
pub use providers::{InMemoryBroker, RabbitMqBroker};
pub use publisher::{PublisherStats, PublisherWorker};
pub use topology::{declare_topology, ExchangeType, Topology};
pub use traits::{
    BrokerConsumer, BrokerPublisher, Delivery, MessageBroker, MessageProperties, OutboundMessage,
    TopologyDeclarer,
};
