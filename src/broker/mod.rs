//! Broker seam for subscription provisioning and message receipt
//!
//! This module provides the abstraction over a hosted topic/subscription
//! broker. The factory only ever talks to these traits, so any concrete
//! backend (or the recording fake in [`crate::testing`]) can be injected.
//!
//! The seam mirrors the three remote operations the factory issues:
//!
//! - "does subscription exist" ([`BrokerSession::subscription_exists`])
//! - "create subscription" ([`BrokerSession::create_subscription`])
//! - "open receiver client" ([`BrokerSession::open_receiver`])
//!
//! plus the receive/settle calls the returned consumers forward to their
//! [`ReceiverClient`].

use crate::config::ConnectionString;
use std::time::Duration;

pub mod types;

pub use types::{
    BrokerError, BrokeredMessage, LockToken, ReceiveMode, SqlFilter, SubscriptionDescriptor,
};

/// Opens sessions against a broker namespace
///
/// One session is opened per consumer build, the same way a namespace
/// manager is derived from a connection string for every build.
#[async_trait::async_trait]
pub trait BrokerConnector: Send + Sync {
    type Session: BrokerSession;

    /// Open a management/messaging session for the namespace behind `connection`
    async fn connect(&self, connection: &ConnectionString) -> Result<Self::Session, BrokerError>;
}

/// Management and messaging operations scoped to one broker namespace
#[async_trait::async_trait]
pub trait BrokerSession: Send + Sync {
    /// Check whether `subscription` exists under `topic`
    async fn subscription_exists(&self, topic: &str, subscription: &str)
    -> Result<bool, BrokerError>;

    /// Create the subscription described by `descriptor`
    ///
    /// When `filter` is `Some`, the subscription's default rule is created
    /// with that predicate instead of the match-all rule.
    async fn create_subscription(
        &self,
        descriptor: &SubscriptionDescriptor,
        filter: Option<&SqlFilter>,
    ) -> Result<(), BrokerError>;

    /// Open a receiver client bound to `topic/subscription` in `mode`
    async fn open_receiver(
        &self,
        topic: &str,
        subscription: &str,
        mode: ReceiveMode,
    ) -> Result<Box<dyn ReceiverClient>, BrokerError>;
}

/// An open receiver bound to a single subscription
#[async_trait::async_trait]
pub trait ReceiverClient: Send + Sync {
    /// Receive mode the client was opened with
    fn mode(&self) -> ReceiveMode;

    /// Wait up to `max_wait` for the next message
    async fn receive(&mut self, max_wait: Duration) -> Result<Option<BrokeredMessage>, BrokerError>;

    /// Complete a peek-locked message, removing it from the subscription
    async fn complete(&mut self, lock_token: &LockToken) -> Result<(), BrokerError>;

    /// Abandon a peek-locked message, releasing its lock for redelivery
    async fn abandon(&mut self, lock_token: &LockToken) -> Result<(), BrokerError>;

    /// Release the underlying link
    async fn close(&mut self) -> Result<(), BrokerError>;
}
