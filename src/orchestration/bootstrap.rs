//! # Application Bootstrap
//!
//! Wires configuration, broker, event queue, workers and HTTP router into an
//! [`AppHandle`] ready to run.
//!
//! Order matters: topology is declared before either worker exists, and the
//! consumer is subscribed before the HTTP listener is bound, so a broker
//! problem stops the process before it accepts any request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use super::lifecycle::Lifecycle;
use super::LifecycleError;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::event_queue;
use crate::messaging::providers::RabbitMqBroker;
use crate::messaging::{
    declare_topology, ConsumerStats, ConsumerWorker, DeliveryHandler, LoggingDeliveryHandler,
    MessageBroker, PublisherStats, PublisherWorker, Topology,
};
use crate::users::{InMemoryUserRepository, UserService};
use crate::web::{create_app, AppState};

/// A fully wired application, not yet running
pub struct AppHandle<B: MessageBroker> {
    lifecycle: Lifecycle,
    broker: Arc<B>,
    local_addr: SocketAddr,
    users: UserService,
    publisher_stats: Arc<PublisherStats>,
    consumer_stats: Arc<ConsumerStats>,
}

impl<B: MessageBroker> std::fmt::Debug for AppHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("provider", &self.broker.provider_name())
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl<B: MessageBroker> AppHandle<B> {
    /// Address the HTTP listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn user_service(&self) -> UserService {
        self.users.clone()
    }

    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.lifecycle.shutdown_token()
    }

    pub fn publisher_stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.publisher_stats)
    }

    pub fn consumer_stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.consumer_stats)
    }

    pub fn without_signal_handling(self) -> Self {
        Self {
            lifecycle: self.lifecycle.without_signal_handling(),
            ..self
        }
    }

    /// Run until shutdown, then close the broker connection
    pub async fn run(self) -> Result<()> {
        let result = self.lifecycle.run().await;

        if let Err(e) = self.broker.close().await {
            warn!(error = %e, "Broker connection did not close cleanly");
        }

        info!(
            published = self.publisher_stats.published(),
            publish_failures = self.publisher_stats.failed(),
            discarded = self.publisher_stats.discarded(),
            received = self.consumer_stats.received(),
            "Event pipeline stopped"
        );

        result.map_err(Into::into)
    }
}

/// Connect to RabbitMQ and wire the application around it
pub async fn bootstrap(config: &AppConfig) -> Result<AppHandle<RabbitMqBroker>> {
    config.validate()?;
    let dsn = config.amqp_dsn()?;
    let broker = RabbitMqBroker::connect(&dsn, &config.mq, &config.app.name).await?;
    bootstrap_with_broker(config, broker, LoggingDeliveryHandler).await
}

/// Wire the application around an already connected broker.
///
/// The broker is closed again if any step fails.
pub async fn bootstrap_with_broker<B, H>(
    config: &AppConfig,
    broker: B,
    handler: H,
) -> Result<AppHandle<B>>
where
    B: MessageBroker,
    H: DeliveryHandler,
{
    let broker = Arc::new(broker);
    match wire(config, Arc::clone(&broker), handler).await {
        Ok(handle) => Ok(handle),
        Err(e) => {
            if let Err(close_err) = broker.close().await {
                warn!(error = %close_err, "Broker close after failed startup also failed");
            }
            Err(e)
        }
    }
}

async fn wire<B, H>(config: &AppConfig, broker: Arc<B>, handler: H) -> Result<AppHandle<B>>
where
    B: MessageBroker,
    H: DeliveryHandler,
{
    config.validate()?;
    let topology = Topology::from_config(&config.mq)?;
    declare_topology(broker.as_ref(), &topology).await?;

    let (events_tx, events_rx) = event_queue(config.events.queue_capacity);

    let publisher = PublisherWorker::new(
        topology.exchange.clone(),
        events_rx,
        broker.publisher().await?,
    );
    let publisher_stats = publisher.stats();

    let consumer_handle = broker.consumer().await?;
    declare_topology(&consumer_handle, &topology).await?;
    let consumer = ConsumerWorker::subscribe(consumer_handle, handler, topology.queue.clone()).await?;
    let consumer_stats = consumer.stats();

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| LifecycleError::bind(&address, e.to_string()))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| LifecycleError::bind(&address, e.to_string()))?;

    let users = UserService::new(Arc::new(InMemoryUserRepository::new()), events_tx);
    let router = create_app(AppState::new(
        users.clone(),
        config.app.name.clone(),
        config.app.env.clone(),
    ));

    info!(
        provider = broker.provider_name(),
        %local_addr,
        queue_capacity = config.events.queue_capacity,
        "Application wired"
    );

    let lifecycle = Lifecycle::new(config.app.name.clone(), config.events.shutdown_grace())
        .with_server("http", move |token| async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        })
        .with_worker("publisher", move |token| async move {
            publisher.run(token).await;
            Ok::<(), Infallible>(())
        })
        .with_worker("consumer", move |token| async move {
            consumer.run(token).await;
            Ok::<(), Infallible>(())
        });

    Ok(AppHandle {
        lifecycle,
        broker,
        local_addr,
        users,
        publisher_stats,
        consumer_stats,
    })
}
