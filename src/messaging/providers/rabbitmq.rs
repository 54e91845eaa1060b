//! # RabbitMQ Broker
//!
//! RabbitMQ implementation of the broker capability traits using the `lapin`
//! crate.
//!
//! ## Channels
//!
//! One AMQP connection, one channel per role:
//!
//! | Role | Channel | Lifetime |
//! |------|---------|----------|
//! | Topology | short-lived | closed right after declaring |
//! | Publisher | exclusive | owned by the publisher worker |
//! | Consumer | exclusive | owned by the consumer worker |
//!
//! Publishes are persistent (`delivery_mode = 2`) and mandatory. The consumer
//! subscribes with `no_ack`, so deliveries are acknowledged on hand-over.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use crate::config::MqConfig;
use crate::messaging::topology::{ExchangeType, Topology};
use crate::messaging::traits::{
    BrokerConsumer, BrokerPublisher, Delivery, MessageBroker, OutboundMessage, TopologyDeclarer,
};
use crate::messaging::MessagingError;

const REPLY_SUCCESS: u16 = 200;

impl From<ExchangeType> for ExchangeKind {
    fn from(kind: ExchangeType) -> Self {
        match kind {
            ExchangeType::Direct => ExchangeKind::Direct,
            ExchangeType::Fanout => ExchangeKind::Fanout,
            ExchangeType::Topic => ExchangeKind::Topic,
            ExchangeType::Headers => ExchangeKind::Headers,
        }
    }
}

/// Append the heartbeat interval to an AMQP URI
fn with_heartbeat(dsn: &str, heartbeat_seconds: u16) -> String {
    if heartbeat_seconds == 0 || dsn.contains("heartbeat=") {
        return dsn.to_string();
    }
    let separator = if dsn.contains('?') { '&' } else { '?' };
    format!("{dsn}{separator}heartbeat={heartbeat_seconds}")
}

/// Scheme and host portion of an AMQP URI, credentials removed
pub fn redact_dsn(dsn: &str) -> String {
    match (dsn.find("://"), dsn.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***@{}", &dsn[..scheme_end + 3], &dsn[at + 1..])
        }
        _ => dsn.to_string(),
    }
}

/// Declare exchange, queue and bindings on `channel`
async fn declare_on(channel: &Channel, topology: &Topology) -> Result<(), MessagingError> {
    channel
        .exchange_declare(
            &topology.exchange,
            topology.exchange_type.into(),
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            MessagingError::topology(format!("exchange {}", topology.exchange), e.to_string())
        })?;

    channel
        .queue_declare(
            &topology.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| MessagingError::topology(format!("queue {}", topology.queue), e.to_string()))?;

    for routing_key in &topology.routing_keys {
        channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::topology(
                    format!(
                        "binding {} -> {} ({routing_key})",
                        topology.exchange, topology.queue
                    ),
                    e.to_string(),
                )
            })?;
    }

    Ok(())
}

/// RabbitMQ connection shared by the publisher and consumer channels
#[derive(Debug)]
pub struct RabbitMqBroker {
    connection: Connection,
    redacted_url: String,
}

impl RabbitMqBroker {
    /// Dial the broker, bounded by the configured dial timeout
    pub async fn connect(
        dsn: &str,
        config: &MqConfig,
        connection_name: &str,
    ) -> Result<Self, MessagingError> {
        let redacted_url = redact_dsn(dsn);
        let uri = with_heartbeat(dsn, config.heartbeat_seconds);
        let timeout = config.dial_timeout();

        let connect = Connection::connect(
            &uri,
            ConnectionProperties::default().with_connection_name(connection_name.into()),
        );
        let connection = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| MessagingError::timeout("rabbitmq dial", timeout.as_secs()))?
            .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        info!(
            url = %redacted_url,
            heartbeat_seconds = config.heartbeat_seconds,
            "Connected to RabbitMQ"
        );

        Ok(Self {
            connection,
            redacted_url,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub fn url_redacted(&self) -> &str {
        &self.redacted_url
    }

    async fn open_channel(&self) -> Result<Channel, MessagingError> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::channel(format!("RabbitMQ channel creation failed: {e}")))
    }
}

#[async_trait]
impl TopologyDeclarer for RabbitMqBroker {
    async fn declare(&self, topology: &Topology) -> Result<(), MessagingError> {
        let channel = self.open_channel().await?;
        let result = declare_on(&channel, topology).await;
        if let Err(e) = channel.close(REPLY_SUCCESS, "topology declared").await {
            debug!(error = %e, "Topology channel close failed");
        }
        result
    }
}

#[async_trait]
impl MessageBroker for RabbitMqBroker {
    type Publisher = RabbitMqPublisher;
    type Consumer = RabbitMqConsumer;

    async fn publisher(&self) -> Result<Self::Publisher, MessagingError> {
        Ok(RabbitMqPublisher {
            channel: self.open_channel().await?,
        })
    }

    async fn consumer(&self) -> Result<Self::Consumer, MessagingError> {
        Ok(RabbitMqConsumer {
            channel: self.open_channel().await?,
            deliveries: None,
        })
    }

    async fn close(&self) -> Result<(), MessagingError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.connection
            .close(REPLY_SUCCESS, "shutdown")
            .await
            .map_err(|e| MessagingError::connection(format!("RabbitMQ close failed: {e}")))?;
        info!(url = %self.redacted_url, "RabbitMQ connection closed");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

/// Publish channel owned by the publisher worker
#[derive(Debug)]
pub struct RabbitMqPublisher {
    channel: Channel,
}

#[async_trait]
impl BrokerPublisher for RabbitMqPublisher {
    async fn publish(&mut self, message: OutboundMessage) -> Result<(), MessagingError> {
        let props = &message.properties;
        let mut properties = BasicProperties::default()
            .with_content_type(props.content_type.clone().into())
            .with_message_id(props.message_id.clone().into())
            .with_type(props.kind.clone().into())
            .with_timestamp(u64::try_from(props.timestamp.timestamp()).unwrap_or_default());
        if props.persistent {
            properties = properties.with_delivery_mode(2);
        }

        let publish_error =
            |e: lapin::Error| MessagingError::publish(&message.exchange, &message.routing_key, e.to_string());

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                &message.body,
                properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "publisher stopped")
            .await
            .map_err(|e| MessagingError::channel(format!("publish channel close failed: {e}")))
    }
}

/// Consume channel owned by the consumer worker
pub struct RabbitMqConsumer {
    channel: Channel,
    deliveries: Option<lapin::Consumer>,
}

impl std::fmt::Debug for RabbitMqConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqConsumer")
            .field("channel", &self.channel.id())
            .field("subscribed", &self.deliveries.is_some())
            .finish()
    }
}

#[async_trait]
impl TopologyDeclarer for RabbitMqConsumer {
    async fn declare(&self, topology: &Topology) -> Result<(), MessagingError> {
        declare_on(&self.channel, topology).await
    }
}

#[async_trait]
impl BrokerConsumer for RabbitMqConsumer {
    async fn subscribe(&mut self, queue: &str, prefetch: u16) -> Result<(), MessagingError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::consume_setup(queue, format!("Failed to set QoS: {e}")))?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::consume_setup(queue, e.to_string()))?;

        debug!(queue, consumer_tag = ?consumer.tag(), "RabbitMQ consumer registered");
        self.deliveries = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Result<Delivery, MessagingError>> {
        let next = self.deliveries.as_mut()?.next().await?;
        Some(
            next.map(|delivery| Delivery {
                routing_key: delivery.routing_key.as_str().to_string(),
                message_id: delivery
                    .properties
                    .message_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                redelivered: delivery.redelivered,
                body: delivery.data,
            })
            .map_err(|e| MessagingError::delivery(e.to_string())),
        )
    }

    async fn close(&mut self) -> Result<(), MessagingError> {
        self.deliveries = None;
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "consumer stopped")
            .await
            .map_err(|e| MessagingError::channel(format!("consume channel close failed: {e}")))
    }
}
