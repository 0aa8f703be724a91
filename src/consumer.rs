//! Consumer variants handed back by the factory
//!
//! - [`SimpleConsumer`] wraps a receive-and-delete client: messages are
//!   gone from the subscription once received (at-most-once).
//! - [`TransactionalConsumer`] wraps a peek-lock client: every received
//!   message must be completed or abandoned (at-least-once).
//!
//! [`MessageConsumer`] is the tagged union returned when the mode is picked
//! at runtime. Each consumer owns exactly one receiver client and releases
//! it on [`close`](SimpleConsumer::close).

use crate::broker::{BrokeredMessage, LockToken, ReceiveMode, ReceiverClient};
use crate::error::{ConsumerError, ConsumerResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Receiver client plus the closed flag shared by both variants
struct Link {
    client: Box<dyn ReceiverClient>,
    closed: bool,
}

impl Link {
    fn new(client: Box<dyn ReceiverClient>) -> Self {
        Self {
            client,
            closed: false,
        }
    }

    fn open_client(&mut self) -> ConsumerResult<&mut Box<dyn ReceiverClient>> {
        if self.closed {
            return Err(ConsumerError::Closed);
        }
        Ok(&mut self.client)
    }

    async fn receive(&mut self, max_wait: Duration) -> ConsumerResult<Option<BrokeredMessage>> {
        self.open_client()?
            .receive(max_wait)
            .await
            .map_err(ConsumerError::Receive)
    }

    async fn close(&mut self) -> ConsumerResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.client.close().await.map_err(|e| {
            warn!(error = %e, "Receiver did not close cleanly");
            ConsumerError::Receive(e)
        })
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("mode", &self.client.mode())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Receive-and-delete consumer
#[derive(Debug)]
pub struct SimpleConsumer {
    link: Link,
}

impl SimpleConsumer {
    pub(crate) fn new(client: Box<dyn ReceiverClient>) -> Self {
        Self {
            link: Link::new(client),
        }
    }

    /// Receive the next message, waiting up to `max_wait`
    ///
    /// The broker has already removed the returned message; there is
    /// nothing to acknowledge.
    pub async fn receive(&mut self, max_wait: Duration) -> ConsumerResult<Option<BrokeredMessage>> {
        self.link.receive(max_wait).await
    }

    /// Release the underlying receiver client
    ///
    /// Later calls to `receive` fail with [`ConsumerError::Closed`]; closing
    /// again is a no-op.
    pub async fn close(&mut self) -> ConsumerResult<()> {
        self.link.close().await
    }
}

/// A peek-locked message awaiting settlement
///
/// Consumed by [`TransactionalConsumer::complete`] or
/// [`TransactionalConsumer::abandon`], so a delivery is settled at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedMessage {
    message: BrokeredMessage,
    lock_token: LockToken,
}

impl LockedMessage {
    pub fn message(&self) -> &BrokeredMessage {
        &self.message
    }

    pub fn lock_token(&self) -> LockToken {
        self.lock_token
    }
}

/// Peek-lock consumer with explicit complete/abandon
#[derive(Debug)]
pub struct TransactionalConsumer {
    link: Link,
}

impl TransactionalConsumer {
    pub(crate) fn new(client: Box<dyn ReceiverClient>) -> Self {
        Self {
            link: Link::new(client),
        }
    }

    /// Receive and lock the next message, waiting up to `max_wait`
    pub async fn receive(&mut self, max_wait: Duration) -> ConsumerResult<Option<LockedMessage>> {
        let Some(message) = self.link.receive(max_wait).await? else {
            return Ok(None);
        };

        let lock_token = message.lock_token.ok_or_else(|| {
            ConsumerError::Receive(crate::broker::BrokerError::Rejected(format!(
                "peek-lock delivery of message {} carried no lock token",
                message.message_id
            )))
        })?;

        Ok(Some(LockedMessage {
            message,
            lock_token,
        }))
    }

    /// Complete the message, removing it from the subscription
    pub async fn complete(&mut self, locked: LockedMessage) -> ConsumerResult<()> {
        debug!(message_id = %locked.message.message_id, "Completing message");
        self.link
            .open_client()?
            .complete(&locked.lock_token)
            .await
            .map_err(ConsumerError::Settlement)
    }

    /// Abandon the message, releasing its lock so it can be redelivered
    pub async fn abandon(&mut self, locked: LockedMessage) -> ConsumerResult<()> {
        debug!(message_id = %locked.message.message_id, "Abandoning message");
        self.link
            .open_client()?
            .abandon(&locked.lock_token)
            .await
            .map_err(ConsumerError::Settlement)
    }

    /// Release the underlying receiver client
    ///
    /// Messages still locked are redelivered by the broker once their lock
    /// expires. Later receive or settlement calls fail with
    /// [`ConsumerError::Closed`].
    pub async fn close(&mut self) -> ConsumerResult<()> {
        self.link.close().await
    }
}

/// A message received through a [`MessageConsumer`]
#[derive(Debug)]
pub enum Delivery {
    /// Already removed from the subscription
    Settled(BrokeredMessage),
    /// Locked; settle through [`MessageConsumer::as_transactional_mut`]
    Locked(LockedMessage),
}

impl Delivery {
    pub fn message(&self) -> &BrokeredMessage {
        match self {
            Delivery::Settled(message) => message,
            Delivery::Locked(locked) => locked.message(),
        }
    }
}

/// Consumer whose variant is selected at construction time
#[derive(Debug)]
pub enum MessageConsumer {
    Simple(SimpleConsumer),
    Transactional(TransactionalConsumer),
}

impl MessageConsumer {
    pub fn mode(&self) -> ReceiveMode {
        match self {
            MessageConsumer::Simple(_) => ReceiveMode::ReceiveAndDelete,
            MessageConsumer::Transactional(_) => ReceiveMode::PeekLock,
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, MessageConsumer::Transactional(_))
    }

    /// Receive the next message regardless of variant
    pub async fn receive(&mut self, max_wait: Duration) -> ConsumerResult<Option<Delivery>> {
        match self {
            MessageConsumer::Simple(c) => Ok(c.receive(max_wait).await?.map(Delivery::Settled)),
            MessageConsumer::Transactional(c) => {
                Ok(c.receive(max_wait).await?.map(Delivery::Locked))
            }
        }
    }

    /// Complete/abandon capability, present only on the transactional variant
    pub fn as_transactional_mut(&mut self) -> Option<&mut TransactionalConsumer> {
        match self {
            MessageConsumer::Transactional(c) => Some(c),
            MessageConsumer::Simple(_) => None,
        }
    }

    pub fn into_simple(self) -> Option<SimpleConsumer> {
        match self {
            MessageConsumer::Simple(c) => Some(c),
            MessageConsumer::Transactional(_) => None,
        }
    }

    pub fn into_transactional(self) -> Option<TransactionalConsumer> {
        match self {
            MessageConsumer::Transactional(c) => Some(c),
            MessageConsumer::Simple(_) => None,
        }
    }

    pub async fn close(&mut self) -> ConsumerResult<()> {
        match self {
            MessageConsumer::Simple(c) => c.close().await,
            MessageConsumer::Transactional(c) => c.close().await,
        }
    }
}

impl From<SimpleConsumer> for MessageConsumer {
    fn from(consumer: SimpleConsumer) -> Self {
        MessageConsumer::Simple(consumer)
    }
}

impl From<TransactionalConsumer> for MessageConsumer {
    fn from(consumer: TransactionalConsumer) -> Self {
        MessageConsumer::Transactional(consumer)
    }
}
