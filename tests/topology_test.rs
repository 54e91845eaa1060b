//! Topology declaration semantics

mod common;

use usermanager::error::UserManagerError;
use usermanager::messaging::{
    declare_topology, ExchangeType, InMemoryBroker, MessagingError, Topology, TopologyDeclarer,
};
use usermanager::orchestration::bootstrap_with_broker;

use common::{test_config, RecordingHandler};

#[tokio::test]
async fn test_declare_twice_is_idempotent() {
    let broker = InMemoryBroker::new();
    let topology = Topology::new("users", ExchangeType::Direct, "users.events");

    declare_topology(&broker, &topology).await.unwrap();
    declare_topology(&broker, &topology).await.unwrap();

    assert_eq!(broker.declare_calls(), 2);
    assert_eq!(broker.binding_count(), 3);
    for routing_key in ["POST", "PUT", "DELETE"] {
        assert!(broker.has_binding("users.events", "users", routing_key));
    }
}

#[tokio::test]
async fn test_conflicting_exchange_type_fails() {
    let broker = InMemoryBroker::new();
    broker
        .declare(&Topology::new("users", ExchangeType::Fanout, "audit"))
        .await
        .unwrap();

    let err = declare_topology(
        &broker,
        &Topology::new("users", ExchangeType::Direct, "users.events"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, MessagingError::Topology { .. }));
    assert!(err.is_startup_fatal());
}

#[tokio::test]
async fn test_bootstrap_aborts_on_topology_conflict() {
    let broker = InMemoryBroker::new();
    broker
        .declare(&Topology::new("users", ExchangeType::Topic, "other"))
        .await
        .unwrap();

    let result = bootstrap_with_broker(&test_config(), broker.clone(), RecordingHandler::new()).await;

    assert!(matches!(
        result,
        Err(UserManagerError::Messaging(MessagingError::Topology { .. }))
    ));
    // Nothing was published or bound for the rejected topology
    assert_eq!(broker.published_count(), 0);
    assert!(!broker.has_binding("users.events", "users", "POST"));
}

#[tokio::test]
async fn test_consumer_redeclares_topology() {
    let broker = InMemoryBroker::new();
    let app = bootstrap_with_broker(&test_config(), broker.clone(), RecordingHandler::new())
        .await
        .unwrap();

    // Once for startup, once on the consume channel
    assert_eq!(broker.declare_calls(), 2);
    assert_eq!(broker.binding_count(), 3);
    drop(app);
}
