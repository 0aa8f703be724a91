//! Value types exchanged with the broker
//!
//! Pure data: descriptors, filters, receive modes, received messages and
//! the broker-reported error kinds.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Time-to-live applied to a new subscription when none is configured
pub const DEFAULT_TIME_TO_EXPIRE: Duration = Duration::from_secs(4 * 24 * 60 * 60);

/// Delivery mode a receiver client is opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    /// Broker removes the message as it is handed out (at-most-once)
    ReceiveAndDelete,
    /// Broker locks the message until it is completed or abandoned (at-least-once)
    PeekLock,
}

impl ReceiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiveAndDelete => "receive_and_delete",
            Self::PeekLock => "peek_lock",
        }
    }
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation-time description of a subscription
///
/// Built fresh for every provisioning call and never stored locally; the
/// broker is authoritative once the subscription exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionDescriptor {
    pub topic: String,
    pub subscription: String,
    #[serde(with = "duration_secs")]
    pub default_message_time_to_live: Duration,
    pub dead_lettering_on_message_expiration: bool,
    pub dead_lettering_on_filter_evaluation_exceptions: bool,
}

impl SubscriptionDescriptor {
    /// Build a descriptor with dead-lettering disabled on both paths
    ///
    /// `time_to_expire` falls back to [`DEFAULT_TIME_TO_EXPIRE`].
    pub fn new(topic: &str, subscription: &str, time_to_expire: Option<Duration>) -> Self {
        Self {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            default_message_time_to_live: time_to_expire.unwrap_or(DEFAULT_TIME_TO_EXPIRE),
            dead_lettering_on_message_expiration: false,
            dead_lettering_on_filter_evaluation_exceptions: false,
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

/// Broker-evaluated SQL-like predicate over message properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SqlFilter(String);

impl SqlFilter {
    /// Build a filter from optional configured text
    ///
    /// Blank or whitespace-only text means "no filter". Non-blank text is
    /// kept verbatim.
    pub fn from_optional(expression: Option<&str>) -> Option<Self> {
        expression
            .filter(|e| !e.trim().is_empty())
            .map(|e| Self(e.to_string()))
    }

    pub fn expression(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock handle for a peek-locked delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub Uuid);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as handed out by a receiver client
#[derive(Debug, Clone, PartialEq)]
pub struct BrokeredMessage {
    pub message_id: String,
    pub body: Bytes,
    pub properties: HashMap<String, serde_json::Value>,
    pub enqueued_at: DateTime<Utc>,
    pub delivery_count: u32,
    /// Present only for peek-lock deliveries
    pub lock_token: Option<LockToken>,
}

impl BrokeredMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            properties: HashMap::new(),
            enqueued_at: Utc::now(),
            delivery_count: 0,
            lock_token: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Errors reported by the broker or its client library
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    #[error("Message lock lost: {lock_token}")]
    LockLost { lock_token: LockToken },
}

impl BrokerError {
    /// Whether this is the "already exists" outcome of a lost creation race
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BrokerError::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_ttl_to_four_days() {
        let descriptor = SubscriptionDescriptor::new("orders", "billing", None);
        assert_eq!(
            descriptor.default_message_time_to_live,
            Duration::from_secs(345_600)
        );
        assert!(!descriptor.dead_lettering_on_message_expiration);
        assert!(!descriptor.dead_lettering_on_filter_evaluation_exceptions);
    }

    #[test]
    fn test_descriptor_keeps_explicit_ttl() {
        let ttl = Duration::from_secs(90);
        let descriptor = SubscriptionDescriptor::new("orders", "billing", Some(ttl));
        assert_eq!(descriptor.default_message_time_to_live, ttl);
    }

    #[test]
    fn test_descriptor_serializes_ttl_as_seconds() {
        let descriptor = SubscriptionDescriptor::new("orders", "billing", None);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["default_message_time_to_live"], 345_600);
        assert_eq!(json["dead_lettering_on_message_expiration"], false);
    }

    #[test]
    fn test_sql_filter_blank_is_none() {
        assert_eq!(SqlFilter::from_optional(None), None);
        assert_eq!(SqlFilter::from_optional(Some("")), None);
        assert_eq!(SqlFilter::from_optional(Some("   \t\n")), None);
    }

    #[test]
    fn test_sql_filter_keeps_expression_verbatim() {
        let filter = SqlFilter::from_optional(Some(" Priority > 5 ")).unwrap();
        assert_eq!(filter.expression(), " Priority > 5 ");
    }

    #[test]
    fn test_receive_mode_display_matches_serde() {
        assert_eq!(ReceiveMode::ReceiveAndDelete.to_string(), "receive_and_delete");
        assert_eq!(
            serde_json::to_value(ReceiveMode::PeekLock).unwrap(),
            serde_json::json!(ReceiveMode::PeekLock.as_str())
        );
    }

    #[test]
    fn test_already_exists_detection() {
        let err = BrokerError::AlreadyExists {
            entity: "orders/billing".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(!BrokerError::Unavailable("timeout".to_string()).is_already_exists());
    }
}
