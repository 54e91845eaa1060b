//! # Broker Topology
//!
//! Describes the durable exchange, the durable queue and the fixed set of
//! routing-key bindings between them. Declaration is idempotent: declaring the
//! same descriptor again is a no-op on the broker.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::traits::TopologyDeclarer;
use super::MessagingError;
use crate::config::MqConfig;
use crate::events::EventAction;

/// Exchange routing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeType {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeType {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeType::Direct),
            "fanout" => Ok(ExchangeType::Fanout),
            "topic" => Ok(ExchangeType::Topic),
            "headers" => Ok(ExchangeType::Headers),
            other => Err(MessagingError::configuration(
                "exchange_type",
                format!("unsupported exchange type '{other}'"),
            )),
        }
    }
}

/// Exchange, queue and bindings declared at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub exchange_type: ExchangeType,
    pub queue: String,
    pub routing_keys: Vec<String>,
}

impl Topology {
    /// Topology bound under one routing key per [`EventAction`]
    pub fn new(
        exchange: impl Into<String>,
        exchange_type: ExchangeType,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            exchange_type,
            queue: queue.into(),
            routing_keys: EventAction::ALL
                .iter()
                .map(|action| action.routing_key().to_string())
                .collect(),
        }
    }

    pub fn from_config(config: &MqConfig) -> Result<Self, MessagingError> {
        Ok(Self::new(
            config.exchange.clone(),
            config.exchange_type.parse()?,
            config.queue_name.clone(),
        ))
    }
}

/// Declare `topology` through `declarer`, logging the outcome.
///
/// Any failure is returned unchanged; callers treat it as fatal.
pub async fn declare_topology<D>(declarer: &D, topology: &Topology) -> Result<(), MessagingError>
where
    D: TopologyDeclarer + ?Sized,
{
    declarer.declare(topology).await?;
    info!(
        exchange = %topology.exchange,
        exchange_type = %topology.exchange_type,
        queue = %topology.queue,
        routing_keys = ?topology.routing_keys,
        "Broker topology declared"
    );
    Ok(())
}
