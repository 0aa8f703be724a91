//! Recording in-memory broker for tests
//!
//! [`FakeBroker`] implements the whole broker seam and records every
//! remote call the factory makes: connects, existence checks, create
//! requests, receiver opens (with their mode) and settlements. Failures and
//! provisioning races can be injected per operation.

use crate::broker::{
    BrokerConnector, BrokerError, BrokerSession, BrokeredMessage, LockToken, ReceiveMode,
    ReceiverClient, SqlFilter, SubscriptionDescriptor,
};
use crate::config::ConnectionString;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, Mutex};

type SubscriptionKey = (String, String);

fn key(topic: &str, subscription: &str) -> SubscriptionKey {
    (topic.to_string(), subscription.to_string())
}

/// A create call as the broker received it
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub descriptor: SubscriptionDescriptor,
    pub filter: Option<SqlFilter>,
}

/// A receiver open call as the broker received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedReceiver {
    pub topic: String,
    pub subscription: String,
    pub mode: ReceiveMode,
}

/// Settlement of a peek-locked message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Completed(LockToken),
    Abandoned(LockToken),
}

#[derive(Debug, Default)]
struct BrokerState {
    subscriptions: HashSet<SubscriptionKey>,
    queues: HashMap<SubscriptionKey, VecDeque<BrokeredMessage>>,
    locked: HashMap<LockToken, (SubscriptionKey, BrokeredMessage)>,

    connections: Vec<String>,
    exists_checks: Vec<SubscriptionKey>,
    create_requests: Vec<CreateRequest>,
    opened_receivers: Vec<OpenedReceiver>,
    settlements: Vec<Settlement>,
    closed_receivers: usize,

    fail_connect: Option<BrokerError>,
    fail_exists: Option<BrokerError>,
    fail_create: Option<BrokerError>,
    fail_open: Option<BrokerError>,
    create_race: bool,
    exists_gate: Option<ExistsGate>,
}

/// Holds existence checks until `remaining` callers have been answered
#[derive(Debug)]
struct ExistsGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

impl BrokerState {
    fn take_exists_gate(&mut self) -> Option<Arc<Barrier>> {
        let gate = self.exists_gate.as_mut()?;
        gate.remaining -= 1;
        let barrier = gate.barrier.clone();
        if gate.remaining == 0 {
            self.exists_gate = None;
        }
        Some(barrier)
    }
}

/// Mock broker namespace for testing
#[derive(Debug, Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session sharing this broker's state, without going through `connect`
    pub fn session(&self) -> FakeSession {
        FakeSession {
            state: self.state.clone(),
        }
    }

    /// Pre-create a subscription
    pub async fn add_subscription(&self, topic: &str, subscription: &str) {
        self.state
            .lock()
            .await
            .subscriptions
            .insert(key(topic, subscription));
    }

    pub async fn has_subscription(&self, topic: &str, subscription: &str) -> bool {
        self.state
            .lock()
            .await
            .subscriptions
            .contains(&key(topic, subscription))
    }

    /// Make the next create report "already exists", as if another caller won the race
    pub async fn set_create_race(&self, race: bool) {
        self.state.lock().await.create_race = race;
    }

    /// Hold the next `callers` existence checks until all of them have been answered
    ///
    /// Every held check sees the subscriptions as they were before any of
    /// them returned, so concurrent builds all go on to create.
    pub async fn hold_exists_checks(&self, callers: usize) {
        self.state.lock().await.exists_gate = (callers > 0).then(|| ExistsGate {
            barrier: Arc::new(Barrier::new(callers)),
            remaining: callers,
        });
    }

    pub async fn fail_connect_with(&self, error: BrokerError) {
        self.state.lock().await.fail_connect = Some(error);
    }

    pub async fn fail_exists_with(&self, error: BrokerError) {
        self.state.lock().await.fail_exists = Some(error);
    }

    pub async fn fail_create_with(&self, error: BrokerError) {
        self.state.lock().await.fail_create = Some(error);
    }

    pub async fn fail_open_with(&self, error: BrokerError) {
        self.state.lock().await.fail_open = Some(error);
    }

    /// Queue a message on a subscription
    pub async fn enqueue(&self, topic: &str, subscription: &str, message: BrokeredMessage) {
        self.state
            .lock()
            .await
            .queues
            .entry(key(topic, subscription))
            .or_default()
            .push_back(message);
    }

    /// Messages not yet removed from the subscription, locked ones included
    pub async fn pending(&self, topic: &str, subscription: &str) -> usize {
        let state = self.state.lock().await;
        let k = key(topic, subscription);
        let queued = state.queues.get(&k).map_or(0, VecDeque::len);
        let locked = state.locked.values().filter(|(sk, _)| *sk == k).count();
        queued + locked
    }

    /// Redacted connection strings passed to `connect`
    pub async fn connections(&self) -> Vec<String> {
        self.state.lock().await.connections.clone()
    }

    pub async fn exists_checks(&self) -> Vec<(String, String)> {
        self.state.lock().await.exists_checks.clone()
    }

    /// Every create call, including rejected ones
    pub async fn created_subscriptions(&self) -> Vec<CreateRequest> {
        self.state.lock().await.create_requests.clone()
    }

    pub async fn opened_receivers(&self) -> Vec<OpenedReceiver> {
        self.state.lock().await.opened_receivers.clone()
    }

    pub async fn settlements(&self) -> Vec<Settlement> {
        self.state.lock().await.settlements.clone()
    }

    pub async fn closed_receivers(&self) -> usize {
        self.state.lock().await.closed_receivers
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    type Session = FakeSession;

    async fn connect(&self, connection: &ConnectionString) -> Result<FakeSession, BrokerError> {
        let mut state = self.state.lock().await;
        state.connections.push(connection.to_string());
        if let Some(error) = state.fail_connect.clone() {
            return Err(error);
        }
        Ok(FakeSession {
            state: self.state.clone(),
        })
    }
}

/// Session handed out by [`FakeBroker`]
#[derive(Debug, Clone)]
pub struct FakeSession {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BrokerSession for FakeSession {
    async fn subscription_exists(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<bool, BrokerError> {
        let (exists, gate) = {
            let mut state = self.state.lock().await;
            state.exists_checks.push(key(topic, subscription));
            if let Some(error) = state.fail_exists.clone() {
                return Err(error);
            }
            let exists = state.subscriptions.contains(&key(topic, subscription));
            (exists, state.take_exists_gate())
        };

        if let Some(barrier) = gate {
            barrier.wait().await;
        }
        Ok(exists)
    }

    async fn create_subscription(
        &self,
        descriptor: &SubscriptionDescriptor,
        filter: Option<&SqlFilter>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.create_requests.push(CreateRequest {
            descriptor: descriptor.clone(),
            filter: filter.cloned(),
        });
        if let Some(error) = state.fail_create.clone() {
            return Err(error);
        }

        let k = key(&descriptor.topic, &descriptor.subscription);
        if state.create_race {
            state.create_race = false;
            state.subscriptions.insert(k);
            return Err(BrokerError::AlreadyExists {
                entity: format!("{}/{}", descriptor.topic, descriptor.subscription),
            });
        }
        if !state.subscriptions.insert(k) {
            return Err(BrokerError::AlreadyExists {
                entity: format!("{}/{}", descriptor.topic, descriptor.subscription),
            });
        }
        Ok(())
    }

    async fn open_receiver(
        &self,
        topic: &str,
        subscription: &str,
        mode: ReceiveMode,
    ) -> Result<Box<dyn ReceiverClient>, BrokerError> {
        let mut state = self.state.lock().await;
        state.opened_receivers.push(OpenedReceiver {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            mode,
        });
        if let Some(error) = state.fail_open.clone() {
            return Err(error);
        }
        let k = key(topic, subscription);
        if !state.subscriptions.contains(&k) {
            return Err(BrokerError::NotFound {
                entity: format!("{topic}/{subscription}"),
            });
        }
        Ok(Box::new(FakeReceiver {
            state: self.state.clone(),
            key: k,
            mode,
            closed: false,
        }))
    }
}

/// Receiver handed out by [`FakeSession::open_receiver`]
///
/// `receive` never waits: an empty queue yields `None` immediately.
#[derive(Debug)]
pub struct FakeReceiver {
    state: Arc<Mutex<BrokerState>>,
    key: SubscriptionKey,
    mode: ReceiveMode,
    closed: bool,
}

impl FakeReceiver {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::Unavailable("receiver link closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReceiverClient for FakeReceiver {
    fn mode(&self) -> ReceiveMode {
        self.mode
    }

    async fn receive(&mut self, _max_wait: Duration) -> Result<Option<BrokeredMessage>, BrokerError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let Some(mut message) = state
            .queues
            .get_mut(&self.key)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        message.delivery_count += 1;
        match self.mode {
            ReceiveMode::ReceiveAndDelete => {
                message.lock_token = None;
            }
            ReceiveMode::PeekLock => {
                let token = LockToken::new();
                message.lock_token = Some(token);
                state
                    .locked
                    .insert(token, (self.key.clone(), message.clone()));
            }
        }
        Ok(Some(message))
    }

    async fn complete(&mut self, lock_token: &LockToken) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state
            .locked
            .remove(lock_token)
            .ok_or(BrokerError::LockLost {
                lock_token: *lock_token,
            })?;
        state.settlements.push(Settlement::Completed(*lock_token));
        Ok(())
    }

    async fn abandon(&mut self, lock_token: &LockToken) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let (k, mut message) = state
            .locked
            .remove(lock_token)
            .ok_or(BrokerError::LockLost {
                lock_token: *lock_token,
            })?;
        message.lock_token = None;
        state.queues.entry(k).or_default().push_front(message);
        state.settlements.push(Settlement::Abandoned(*lock_token));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.state.lock().await.closed_receivers += 1;
        }
        Ok(())
    }
}
