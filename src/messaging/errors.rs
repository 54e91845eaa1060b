//! # Messaging Error Types
//!
//! Structured errors for broker connectivity, topology declaration, publishing
//! and consuming.

use thiserror::Error;

/// Messaging error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Broker channel error: {message}")]
    Channel { message: String },

    #[error("Topology declaration failed: {entity}: {message}")]
    Topology { entity: String, message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Consumer setup failed for queue {queue_name}: {message}")]
    ConsumeSetup { queue_name: String, message: String },

    #[error("Delivery stream error: {message}")]
    Delivery { message: String },

    #[error("Delivery handler failed: {message}")]
    Handler { message: String },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },

    #[error("Network timeout: operation {operation} timed out after {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create a topology error for an exchange, queue or binding
    pub fn topology(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Topology {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    pub fn consume_setup(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConsumeSetup {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Startup-fatal errors: anything that prevents the pipeline from being wired
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Channel { .. }
                | Self::Topology { .. }
                | Self::ConsumeSetup { .. }
                | Self::Timeout { .. }
                | Self::Configuration { .. }
        )
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
