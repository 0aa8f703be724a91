//! Consumer construction
//!
//! [`ConsumerFactory`] turns a [`ConsumerConfiguration`] into a consumer:
//! resolve credentials, connect, ensure the subscription exists, open a
//! receiver in the requested mode and wrap it. Each build is single-shot
//! and shares no state with other builds.

use crate::broker::{BrokerConnector, BrokerSession, ReceiveMode, ReceiverClient};
use crate::config::{ConnectionString, ConsumerConfiguration};
use crate::consumer::{MessageConsumer, SimpleConsumer, TransactionalConsumer};
use crate::error::{ConsumerError, ConsumerResult};
use crate::provisioner::ensure_subscription;
use tracing::{info, warn, Instrument};

/// Builds consumers against the namespace reached through `C`
#[derive(Debug, Clone)]
pub struct ConsumerFactory<C> {
    connector: C,
}

impl<C: BrokerConnector> ConsumerFactory<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Build a consumer in `mode`
    ///
    /// `ReceiveAndDelete` yields [`MessageConsumer::Simple`], `PeekLock`
    /// yields [`MessageConsumer::Transactional`].
    pub async fn build_consumer(
        &self,
        config: &ConsumerConfiguration,
        mode: ReceiveMode,
    ) -> ConsumerResult<MessageConsumer> {
        let client = self.open_client(config, mode).await?;
        Ok(match mode {
            ReceiveMode::ReceiveAndDelete => SimpleConsumer::new(client).into(),
            ReceiveMode::PeekLock => TransactionalConsumer::new(client).into(),
        })
    }

    /// Build an at-most-once consumer
    pub async fn simple_consumer(
        &self,
        config: &ConsumerConfiguration,
    ) -> ConsumerResult<SimpleConsumer> {
        let client = self
            .open_client(config, ReceiveMode::ReceiveAndDelete)
            .await?;
        Ok(SimpleConsumer::new(client))
    }

    /// Build a peek-lock consumer
    pub async fn transactional_consumer(
        &self,
        config: &ConsumerConfiguration,
    ) -> ConsumerResult<TransactionalConsumer> {
        let client = self.open_client(config, ReceiveMode::PeekLock).await?;
        Ok(TransactionalConsumer::new(client))
    }

    /// Validate, connect, provision, then open the receiver
    async fn open_client(
        &self,
        config: &ConsumerConfiguration,
        mode: ReceiveMode,
    ) -> ConsumerResult<Box<dyn ReceiverClient>> {
        config.validate()?;
        let connection = config.connection_string()?;
        let topic = config.topic.as_str();
        let subscription = config.subscription.as_str();

        let span = crate::consumer_span!(
            topic = %topic,
            subscription = %subscription,
            mode = %mode,
            namespace = %connection.namespace()
        );

        async move {
            let result = self
                .connect_and_open(&connection, topic, subscription, config, mode)
                .await;
            if let Err(e) = &result {
                warn!(error = %e.sanitized_message(), "Consumer build failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn connect_and_open(
        &self,
        connection: &ConnectionString,
        topic: &str,
        subscription: &str,
        config: &ConsumerConfiguration,
        mode: ReceiveMode,
    ) -> ConsumerResult<Box<dyn ReceiverClient>> {
        // An unreachable namespace fails the existence check: report as provisioning
        let session = self
            .connector
            .connect(connection)
            .await
            .map_err(|e| ConsumerError::provisioning(topic, subscription, e))?;

        let provisioned = ensure_subscription(
            &session,
            topic,
            subscription,
            config.time_to_expire(),
            config.filter.as_deref(),
        )
        .await?;

        let client = session
            .open_receiver(topic, subscription, mode)
            .await
            .map_err(|e| ConsumerError::client_open(topic, subscription, mode, e))?;

        info!(provisioned = ?provisioned, "Opened receiver");
        Ok(client)
    }
}
