//! # Service Configuration
//!
//! Typed configuration for the HTTP server, the RabbitMQ connection and topology,
//! and the in-process event pipeline.
//!
//! Values are layered by [`ConfigManager`]: built-in defaults, then an optional
//! configuration file, then environment variables (a `.env` file is read first).
//!
//! ```rust,no_run
//! use usermanager::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let dsn = manager.config().amqp_dsn()?;
//! let capacity = manager.config().events.queue_capacity;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Characters left unescaped in AMQP URI userinfo and vhost segments
const AMQP_URI_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const EXCHANGE_TYPES: [&str; 4] = ["direct", "fanout", "topic", "headers"];

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSettings,
    pub mq: MqConfig,
    pub events: EventsConfig,
}

/// HTTP service identity and listen address
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Deployment environment (development, test, production)
    pub env: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "usermanager".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            env: "development".to_string(),
        }
    }
}

/// RabbitMQ connection and topology settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqConfig {
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub host: String,
    pub amqp_port: Option<u16>,
    pub exchange: String,
    pub exchange_type: String,
    pub queue_name: String,
    pub dial_timeout_seconds: u64,
    pub heartbeat_seconds: u16,
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            vhost: String::new(),
            host: String::new(),
            amqp_port: None,
            exchange: "users".to_string(),
            exchange_type: "direct".to_string(),
            queue_name: "users.events".to_string(),
            dial_timeout_seconds: 10,
            heartbeat_seconds: 10,
        }
    }
}

impl MqConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_seconds)
    }
}

/// In-process event pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Bound of the in-process event queue
    pub queue_capacity: usize,
    /// Grace period granted to in-flight HTTP requests on shutdown
    pub shutdown_grace_seconds: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            shutdown_grace_seconds: 5,
        }
    }
}

impl EventsConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl AppConfig {
    /// `host:port` the HTTP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    /// Build the AMQP connection string.
    ///
    /// User, host and port are required; credentials and vhost are percent-encoded.
    /// An empty vhost selects the broker's default vhost.
    pub fn amqp_dsn(&self) -> ConfigResult<String> {
        let mq = &self.mq;
        if mq.user.is_empty() {
            return Err(ConfigurationError::missing("mq.user"));
        }
        if mq.host.is_empty() {
            return Err(ConfigurationError::missing("mq.host"));
        }
        let port = mq
            .amqp_port
            .ok_or_else(|| ConfigurationError::missing("mq.amqp_port"))?;

        let mut dsn = format!(
            "amqp://{}:{}@{}:{}",
            utf8_percent_encode(&mq.user, AMQP_URI_SEGMENT),
            utf8_percent_encode(&mq.password, AMQP_URI_SEGMENT),
            mq.host,
            port,
        );
        if !mq.vhost.is_empty() {
            dsn.push('/');
            dsn.extend(utf8_percent_encode(&mq.vhost, AMQP_URI_SEGMENT));
        }
        Ok(dsn)
    }

    /// Reject values the event pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mq.exchange.is_empty() {
            return Err(ConfigurationError::missing("mq.exchange"));
        }
        if self.mq.queue_name.is_empty() {
            return Err(ConfigurationError::missing("mq.queue_name"));
        }
        if !EXCHANGE_TYPES.contains(&self.mq.exchange_type.as_str()) {
            return Err(ConfigurationError::invalid(
                "mq.exchange_type",
                format!(
                    "'{}' is not one of {}",
                    self.mq.exchange_type,
                    EXCHANGE_TYPES.join(", ")
                ),
            ));
        }
        if self.events.queue_capacity == 0 {
            return Err(ConfigurationError::invalid(
                "events.queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.events.shutdown_grace_seconds == 0 {
            return Err(ConfigurationError::invalid(
                "events.shutdown_grace_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
