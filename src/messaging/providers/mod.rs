//! Broker providers

pub mod in_memory;
pub mod rabbitmq;

pub use in_memory::{InMemoryBroker, InMemoryConsumer, InMemoryPublisher};
pub use rabbitmq::{RabbitMqBroker, RabbitMqConsumer, RabbitMqPublisher};
