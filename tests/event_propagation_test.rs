//! Event queue and publisher worker behavior against the in-memory broker

mod common;

use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use tokio_test::{assert_pending, assert_ready};
use tokio_util::sync::CancellationToken;

use common::strategies::event_batch_strategy;
use common::{wait_until, within};
use usermanager::events::{event_queue, Event, EventAction, EventEnvelope, EventQueueError};
use usermanager::messaging::{
    BrokerPublisher, ExchangeType, InMemoryBroker, MessageBroker, PublisherWorker, Topology,
    TopologyDeclarer,
};

const EXCHANGE: &str = "users";
const QUEUE: &str = "users.events";
const WAIT: Duration = Duration::from_secs(2);

async fn declared_broker() -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    broker
        .declare(&Topology::new(EXCHANGE, ExchangeType::Direct, QUEUE))
        .await
        .unwrap();
    broker
}

fn event(action: EventAction, n: usize) -> Event {
    Event::new(action, format!("user-{n}"), json!({ "n": n }))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: every enqueued event is published once, in enqueue order
    #[test]
    fn published_order_matches_enqueue_order(batch in event_batch_strategy(40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let broker = declared_broker().await;
            let (tx, rx) = event_queue(8);
            let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
            let stats = worker.stats();
            let token = CancellationToken::new();
            let handle = tokio::spawn(worker.run(token.clone()));

            let mut expected = Vec::new();
            for (i, (action, payload)) in batch.iter().enumerate() {
                let event = Event::new(*action, format!("user-{i}"), payload.clone());
                expected.push((event.id().to_string(), action.routing_key().to_string()));
                tx.enqueue(event).await.unwrap();
            }

            assert!(wait_until(WAIT, || broker.published_count() == batch.len()).await);
            token.cancel();
            within(WAIT, handle).await.unwrap();

            let published: Vec<(String, String)> = broker
                .published()
                .into_iter()
                .map(|m| (m.properties.message_id, m.routing_key))
                .collect();
            assert_eq!(published, expected);
            assert_eq!(stats.published(), batch.len() as u64);
            assert_eq!(stats.failed(), 0);
        });
    }
}

#[tokio::test]
async fn test_published_message_is_persistent_json_envelope() {
    let broker = declared_broker().await;
    let (tx, rx) = event_queue(4);
    let token = CancellationToken::new();
    let handle = tokio::spawn(
        PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap()).run(token.clone()),
    );

    let sent = Event::new(EventAction::Update, "user-9", json!({ "name": "Grace" }));
    tx.enqueue(sent.clone()).await.unwrap();
    assert!(wait_until(WAIT, || broker.published_count() == 1).await);
    token.cancel();
    within(WAIT, handle).await.unwrap();

    let message = &broker.published()[0];
    assert_eq!(message.exchange, EXCHANGE);
    assert_eq!(message.routing_key, "PUT");
    assert!(message.properties.persistent);
    assert_eq!(message.properties.content_type, "application/json");
    assert_eq!(message.properties.kind, "PUT");

    let envelope: EventEnvelope = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(envelope.event_id, sent.id());
    assert_eq!(envelope.event_action, "PUT");
    assert_eq!(envelope.user_id, "user-9");
    assert_eq!(envelope.user_payload, json!({ "name": "Grace" }));
}

#[tokio::test]
async fn test_stalled_publisher_blocks_producer_until_it_resumes() {
    let broker = declared_broker().await;
    broker.pause_publishing();

    let (tx, rx) = event_queue(2);
    let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    // The worker takes the first event and stalls on it
    tx.enqueue(event(EventAction::Create, 1)).await.unwrap();
    assert!(wait_until(WAIT, || tx.available_capacity() == 2).await);
    tx.enqueue(event(EventAction::Create, 2)).await.unwrap();
    tx.enqueue(event(EventAction::Create, 3)).await.unwrap();
    assert_eq!(tx.available_capacity(), 0);

    let mut blocked = tokio_test::task::spawn(tx.enqueue(event(EventAction::Create, 4)));
    assert_pending!(blocked.poll());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_woken());
    assert_pending!(blocked.poll());
    assert_eq!(broker.published_count(), 0);

    broker.resume_publishing();
    assert!(wait_until(WAIT, || blocked.is_woken()).await);
    assert!(assert_ready!(blocked.poll()).is_ok());

    assert!(wait_until(WAIT, || broker.published_count() == 4).await);
    token.cancel();
    within(WAIT, handle).await.unwrap();

    let order: Vec<String> = broker
        .published()
        .iter()
        .map(|m| serde_json::from_slice::<EventEnvelope>(&m.body).unwrap().user_id)
        .collect();
    assert_eq!(order, vec!["user-1", "user-2", "user-3", "user-4"]);
}

#[tokio::test]
async fn test_enqueue_after_close_fails_fast() {
    let (tx, rx) = event_queue(2);
    assert_eq!(rx.close(), 0);

    let rejected = event(EventAction::Delete, 1);
    let rejected_id = rejected.id();
    let result = within(WAIT, tx.enqueue(rejected)).await;
    assert_eq!(
        result,
        Err(EventQueueError::Closed {
            event_id: rejected_id
        })
    );
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_blocked_producer_is_released_when_queue_closes() {
    let (tx, rx) = event_queue(1);
    tx.enqueue(event(EventAction::Create, 1)).await.unwrap();

    let mut blocked = tokio_test::task::spawn(tx.enqueue(event(EventAction::Create, 2)));
    assert_pending!(blocked.poll());

    assert_eq!(rx.close(), 1);
    assert!(blocked.is_woken());
    assert!(assert_ready!(blocked.poll()).is_err());
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_publish_and_discards_buffer() {
    let broker = declared_broker().await;
    broker.pause_publishing();

    let (tx, rx) = event_queue(8);
    for n in 0..5 {
        tx.enqueue(event(EventAction::Create, n)).await.unwrap();
    }

    let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
    let stats = worker.stats();
    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    // The worker has taken the first event and is stuck publishing it
    assert!(wait_until(WAIT, || tx.available_capacity() == 4).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    // Publishing stays paused; the worker must still stop
    within(WAIT, handle).await.unwrap();

    assert_eq!(broker.published_count(), 0);
    assert_eq!(stats.published(), 0);
    assert_eq!(stats.discarded(), 5);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_cancel_after_publish_discards_only_the_buffer() {
    let broker = declared_broker().await;
    broker.pause_publishing();

    let (tx, rx) = event_queue(8);
    for n in 0..5 {
        tx.enqueue(event(EventAction::Create, n)).await.unwrap();
    }

    let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
    let stats = worker.stats();
    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    assert!(wait_until(WAIT, || tx.available_capacity() == 4).await);
    broker.resume_publishing();
    assert!(wait_until(WAIT, || broker.published_count() >= 1).await);
    token.cancel();
    within(WAIT, handle).await.unwrap();

    let published = stats.published();
    assert!(published >= 1);
    assert_eq!(published + stats.discarded(), 5);
    assert_eq!(broker.published_count() as u64, published);
}

#[tokio::test]
async fn test_publish_failure_drops_event_and_keeps_running() {
    let broker = declared_broker().await;
    broker.fail_publishes(true);

    let (tx, rx) = event_queue(8);
    let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
    let stats = worker.stats();
    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    tx.enqueue(event(EventAction::Create, 1)).await.unwrap();
    tx.enqueue(event(EventAction::Update, 1)).await.unwrap();
    assert!(wait_until(WAIT, || stats.failed() == 2).await);

    broker.fail_publishes(false);
    let delivered = event(EventAction::Delete, 1);
    let delivered_id = delivered.id().to_string();
    tx.enqueue(delivered).await.unwrap();
    assert!(wait_until(WAIT, || stats.published() == 1).await);

    token.cancel();
    within(WAIT, handle).await.unwrap();

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].properties.message_id, delivered_id);
}

#[tokio::test]
async fn test_worker_stops_when_all_producers_are_gone() {
    let broker = declared_broker().await;
    let (tx, rx) = event_queue(4);
    tx.enqueue(event(EventAction::Create, 1)).await.unwrap();
    drop(tx);

    let token = CancellationToken::new();
    let worker = PublisherWorker::new(EXCHANGE, rx, broker.publisher().await.unwrap());
    let stats = worker.stats();
    within(WAIT, worker.run(token)).await;

    assert_eq!(stats.published(), 1);
    assert_eq!(stats.discarded(), 0);
}

#[tokio::test]
async fn test_publisher_close_rejects_further_publishes() {
    let broker = declared_broker().await;
    let mut publisher = broker.publisher().await.unwrap();
    publisher.close().await.unwrap();

    let message = usermanager::messaging::OutboundMessage::from_event(
        EXCHANGE,
        &event(EventAction::Create, 1),
    )
    .unwrap();
    assert!(publisher.publish(message).await.is_err());
}
