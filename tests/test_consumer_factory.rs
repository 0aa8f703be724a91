//! Consumer factory behavior tests
//!
//! Drives the factory against the recording fake broker and checks the
//! remote calls it issues:
//! - create-if-absent provisioning (zero or exactly one create)
//! - filter attached only when non-blank
//! - TTL default and pass-through
//! - receive mode chosen per consumer variant
//! - "already exists" races treated as success


use std::time::Duration;
use topic_consumer::broker::types::DEFAULT_TIME_TO_EXPIRE;
use topic_consumer::testing::{FakeBroker, Settlement};
use topic_consumer::{
    BrokerError, BrokeredMessage, ConsumerError, ConsumerFactory, Delivery, ReceiveMode,
    SubscriptionDescriptor,
};

const WAIT: Duration = Duration::from_millis(10);

#[tokio::test]
async fn test_simple_build_against_empty_broker_creates_subscription() {
    // Arrange: empty broker, filter set to the empty string
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = test_helpers::test_config().filter("");

    // Act
    let consumer = factory
        .build_consumer(&config, ReceiveMode::ReceiveAndDelete)
        .await
        .unwrap();

    // Assert: one create, 4 day TTL, no filter, dead-lettering off
    let created = broker.created_subscriptions().await;
    assert_eq!(created.len(), 1);
    let descriptor = &created[0].descriptor;
    assert_eq!(descriptor.topic, "orders");
    assert_eq!(descriptor.subscription, "billing");
    assert_eq!(descriptor.default_message_time_to_live, DEFAULT_TIME_TO_EXPIRE);
    assert_eq!(
        descriptor.default_message_time_to_live,
        Duration::from_secs(4 * 24 * 60 * 60)
    );
    assert!(!descriptor.dead_lettering_on_message_expiration);
    assert!(!descriptor.dead_lettering_on_filter_evaluation_exceptions);
    assert_eq!(created[0].filter, None);

    assert!(!consumer.is_transactional());
    assert!(consumer.into_simple().is_some());
}

#[tokio::test]
async fn test_filter_is_attached_on_create() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = test_helpers::test_config().filter("Priority > 5");

    factory.simple_consumer(&config).await.unwrap();

    let created = broker.created_subscriptions().await;
    assert_eq!(created.len(), 1);
    assert_eq!(
        created[0].filter.as_ref().map(|f| f.expression()),
        Some("Priority > 5")
    );
}

#[tokio::test]
async fn test_whitespace_filter_is_treated_as_absent() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = test_helpers::test_config().filter("  \t ");

    factory.simple_consumer(&config).await.unwrap();

    assert_eq!(broker.created_subscriptions().await[0].filter, None);
}

#[tokio::test]
async fn test_explicit_ttl_is_passed_through() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = test_helpers::test_config().time_to_expire_secs(7200);

    factory.transactional_consumer(&config).await.unwrap();

    assert_eq!(
        broker.created_subscriptions().await[0].descriptor,
        SubscriptionDescriptor::new("orders", "billing", Some(Duration::from_secs(7200)))
    );
}

#[tokio::test]
async fn test_transactional_build_against_existing_subscription() {
    // Arrange: subscription already provisioned
    let broker = FakeBroker::new();
    broker.add_subscription("orders", "billing").await;
    let factory = ConsumerFactory::new(broker.clone());

    // Act
    let mut consumer = factory
        .build_consumer(&test_helpers::test_config(), ReceiveMode::PeekLock)
        .await
        .unwrap();

    // Assert: zero creates, peek-lock receiver, acknowledge capability present
    assert!(broker.created_subscriptions().await.is_empty());
    let opened = broker.opened_receivers().await;
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].mode, ReceiveMode::PeekLock);
    assert_eq!(consumer.mode(), ReceiveMode::PeekLock);
    assert!(consumer.as_transactional_mut().is_some());
}

#[tokio::test]
async fn test_repeated_builds_provision_once() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());

    for _ in 0..3 {
        let mut consumer = factory
            .simple_consumer(&test_helpers::test_config())
            .await
            .unwrap();
        consumer.close().await.unwrap();
    }

    assert_eq!(broker.created_subscriptions().await.len(), 1);
    assert_eq!(broker.exists_checks().await.len(), 3);
    assert_eq!(broker.opened_receivers().await.len(), 3);
    assert_eq!(broker.closed_receivers().await, 3);
}

#[tokio::test]
async fn test_existing_subscription_is_not_updated() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());

    factory
        .simple_consumer(&test_helpers::test_config())
        .await
        .unwrap();
    factory
        .simple_consumer(
            &test_helpers::test_config()
                .filter("Region = 'EU'")
                .time_to_expire_secs(60),
        )
        .await
        .unwrap();

    let created = broker.created_subscriptions().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].filter, None);
    assert_eq!(
        created[0].descriptor.default_message_time_to_live,
        DEFAULT_TIME_TO_EXPIRE
    );
}

#[tokio::test]
async fn test_provisioning_race_still_builds_consumer() {
    let broker = FakeBroker::new();
    broker.set_create_race(true).await;
    let factory = ConsumerFactory::new(broker.clone());

    let consumer = factory
        .build_consumer(&test_helpers::test_config(), ReceiveMode::PeekLock)
        .await;

    assert!(consumer.is_ok(), "race must not surface: {:?}", consumer.err());
    assert_eq!(broker.created_subscriptions().await.len(), 1);
    assert_eq!(broker.opened_receivers().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_builds_for_same_subscription() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = test_helpers::test_config();
    // Both builds see the subscription as missing before either creates it
    broker.hold_exists_checks(2).await;

    let (a, b) = tokio::join!(
        factory.simple_consumer(&config),
        factory.transactional_consumer(&config)
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(broker.has_subscription("orders", "billing").await);
    assert_eq!(broker.exists_checks().await.len(), 2);
    // The losing create hears "already exists" and still succeeds
    assert_eq!(broker.created_subscriptions().await.len(), 2);
    assert_eq!(broker.opened_receivers().await.len(), 2);
}

#[tokio::test]
async fn test_provisioning_error_propagates_without_opening_client() {
    let broker = FakeBroker::new();
    broker
        .fail_create_with(BrokerError::Rejected("quota exceeded".to_string()))
        .await;
    let factory = ConsumerFactory::new(broker.clone());

    let err = factory
        .build_consumer(&test_helpers::test_config(), ReceiveMode::ReceiveAndDelete)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsumerError::Provisioning {
            source: BrokerError::Rejected(_),
            ..
        }
    ));
    assert!(broker.opened_receivers().await.is_empty());
}

#[tokio::test]
async fn test_client_open_error_after_provisioning() {
    let broker = FakeBroker::new();
    broker
        .fail_open_with(BrokerError::Unauthorized("missing Listen claim".to_string()))
        .await;
    let factory = ConsumerFactory::new(broker.clone());

    let err = factory
        .build_consumer(&test_helpers::test_config(), ReceiveMode::ReceiveAndDelete)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsumerError::ClientOpen {
            mode: ReceiveMode::ReceiveAndDelete,
            ..
        }
    ));
}

#[tokio::test]
async fn test_env_var_credential_must_be_set() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let config = topic_consumer::ConsumerConfiguration::new(
        "TOPIC_CONSUMER_IT_UNSET_CONNECTION",
        "orders",
        "billing",
    );

    let err = factory.simple_consumer(&config).await.unwrap_err();

    assert!(matches!(err, ConsumerError::Config(_)));
    assert!(broker.connections().await.is_empty());
}

#[tokio::test]
async fn test_end_to_end_peek_lock_flow() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let mut consumer = factory
        .transactional_consumer(&test_helpers::test_config())
        .await
        .unwrap();

    broker
        .enqueue(
            "orders",
            "billing",
            BrokeredMessage::new("order-1", "{\"total\":12}")
                .with_property("Priority", serde_json::json!(7)),
        )
        .await;
    broker
        .enqueue("orders", "billing", BrokeredMessage::new("order-2", "{}"))
        .await;

    let first = consumer.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(first.message().properties["Priority"], 7);
    let first_token = first.lock_token();
    consumer.abandon(first).await.unwrap();

    let again = consumer.receive(WAIT).await.unwrap().unwrap();
    assert_eq!(again.message().message_id, "order-1");
    let again_token = again.lock_token();
    consumer.complete(again).await.unwrap();

    let second = consumer.receive(WAIT).await.unwrap().unwrap();
    let second_token = second.lock_token();
    consumer.complete(second).await.unwrap();

    assert!(consumer.receive(WAIT).await.unwrap().is_none());
    assert_eq!(
        broker.settlements().await,
        vec![
            Settlement::Abandoned(first_token),
            Settlement::Completed(again_token),
            Settlement::Completed(second_token),
        ]
    );
    consumer.close().await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_receive_and_delete_flow() {
    let broker = FakeBroker::new();
    let factory = ConsumerFactory::new(broker.clone());
    let mut consumer = factory
        .build_consumer(&test_helpers::test_config(), ReceiveMode::ReceiveAndDelete)
        .await
        .unwrap();

    broker
        .enqueue("orders", "billing", BrokeredMessage::new("order-1", "body"))
        .await;

    let delivery = consumer.receive(WAIT).await.unwrap().unwrap();
    assert!(matches!(delivery, Delivery::Settled(_)));
    assert_eq!(delivery.message().body.as_ref(), b"body");
    assert_eq!(broker.pending("orders", "billing").await, 0);
    assert!(broker.settlements().await.is_empty());

    consumer.close().await.unwrap();
}
