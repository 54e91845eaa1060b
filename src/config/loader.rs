//! Configuration Loader
//!
//! Layers defaults, an optional configuration file and environment variables
//! into an [`AppConfig`] using the `config` crate.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use config::{Config, File};
use tracing::{debug, info};

use super::error::ConfigResult;
use super::AppConfig;

/// Default configuration file stem, resolved with any supported extension
const DEFAULT_CONFIG_FILE: &str = "config/usermanager";

/// Environment variable selecting an explicit configuration file
const CONFIG_PATH_VAR: &str = "USERMANAGER_CONFIG";

/// Environment variables and the configuration keys they override
const ENV_BINDINGS: &[(&str, &str)] = &[
    ("SERVICE_NAME", "app.name"),
    ("SERVICE_HOST", "app.host"),
    ("SERVICE_PORT", "app.port"),
    ("SERVICE_ENV", "app.env"),
    ("RABBITMQ_USER", "mq.user"),
    ("RABBITMQ_PASSWORD", "mq.password"),
    ("RABBITMQ_VHOST", "mq.vhost"),
    ("RABBITMQ_HOST", "mq.host"),
    ("RABBITMQ_AMQP_PORT", "mq.amqp_port"),
    ("RABBITMQ_EXCHANGE", "mq.exchange"),
    ("RABBITMQ_EXCHANGE_TYPE", "mq.exchange_type"),
    ("RABBITMQ_QUEUE_NAME", "mq.queue_name"),
    ("RABBITMQ_DIAL_TIMEOUT_SECONDS", "mq.dial_timeout_seconds"),
    ("RABBITMQ_HEARTBEAT_SECONDS", "mq.heartbeat_seconds"),
    ("EVENT_QUEUE_CAPACITY", "events.queue_capacity"),
    ("SHUTDOWN_GRACE_SECONDS", "events.shutdown_grace_seconds"),
];

/// Loaded, validated configuration plus the environment it was resolved for
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration from `.env`, the process environment and the default
    /// (or `USERMANAGER_CONFIG`) file location
    pub fn load() -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => debug!("No .env file found, using process environment"),
            Err(e) => debug!(error = %e, "Ignoring unreadable .env file"),
        }

        let file = env::var(CONFIG_PATH_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self::load_from(file.as_deref(), env::vars())
    }

    /// Load configuration from an explicit file and set of variables.
    ///
    /// Useful for testing without touching the process environment.
    pub fn load_from<I>(file: Option<&Path>, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        let mut builder = Config::builder();
        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        for (var, key) in ENV_BINDINGS {
            builder = builder.set_override_option(*key, vars.get(*var).cloned())?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        let environment = config.app.env.clone();
        info!(
            service = %config.app.name,
            environment = %environment,
            bind_address = %config.bind_address(),
            exchange = %config.mq.exchange,
            queue = %config.mq.queue_name,
            queue_capacity = config.events.queue_capacity,
            "Configuration loaded successfully"
        );
        debug!(config = %Self::sanitize_config_for_logging(&config), "Resolved configuration");

        Ok(Self {
            config,
            environment,
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Deployment environment the configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// Configuration as JSON with credentials masked
    fn sanitize_config_for_logging(config: &AppConfig) -> serde_json::Value {
        let mut value = serde_json::to_value(config).unwrap_or_default();
        if let Some(password) = value.pointer_mut("/mq/password") {
            *password = serde_json::Value::String("***REDACTED***".to_string());
        }
        value
    }
}
