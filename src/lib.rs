//! Topic Consumer
//!
//! Provisions topic subscriptions on a hosted message broker and builds
//! consumers over them.
//!
//! # Overview
//!
//! - [`provisioner::ensure_subscription`] creates a subscription if it is
//!   missing (create-if-absent, never update), optionally with a filter
//! - [`ConsumerFactory`] resolves configuration, provisions, and opens a
//!   receiver in an explicit [`ReceiveMode`]
//! - [`SimpleConsumer`] (receive-and-delete, at-most-once) and
//!   [`TransactionalConsumer`] (peek-lock, complete/abandon) wrap the
//!   opened receiver
//!
//! Broker access goes through the [`broker`] traits; [`testing::FakeBroker`]
//! is an in-memory implementation that records every call.
//!
//! # Quick Start
//!
//! ```rust
//! use topic_consumer::testing::FakeBroker;
//! use topic_consumer::{ConsumerConfiguration, ConsumerFactory, ReceiveMode};
//!
//! # tokio_test::block_on(async {
//! let config = ConsumerConfiguration::with_connection_string(
//!     "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=listen;SharedAccessKey=k",
//!     "orders",
//!     "billing",
//! )
//! .filter("Priority > 5");
//!
//! let factory = ConsumerFactory::new(FakeBroker::new());
//! let mut consumer = factory.build_consumer(&config, ReceiveMode::PeekLock).await?;
//! assert!(consumer.is_transactional());
//! consumer.close().await?;
//! # Ok::<(), topic_consumer::ConsumerError>(())
//! # });
//! ```

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod factory;
pub mod observability;
pub mod provisioner;
pub mod testing;

pub use broker::{
    BrokerConnector, BrokerError, BrokerSession, BrokeredMessage, LockToken, ReceiveMode,
    ReceiverClient, SqlFilter, SubscriptionDescriptor,
};
pub use config::{ConfigError, ConnectionString, ConsumerConfiguration};
pub use consumer::{Delivery, LockedMessage, MessageConsumer, SimpleConsumer, TransactionalConsumer};
pub use error::{ConsumerError, ConsumerResult};
pub use factory::ConsumerFactory;
pub use provisioner::{ensure_subscription, Provisioned};
