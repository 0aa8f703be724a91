//! Error types for subscription provisioning and consumer operations
//!
//! Provisioning and client-open failures are surfaced verbatim with the
//! broker's error as `source`; nothing here retries.

use crate::broker::{BrokerError, ReceiveMode};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for consumer construction and use
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Failed to provision subscription {topic}/{subscription}")]
    Provisioning {
        topic: String,
        subscription: String,
        #[source]
        source: BrokerError,
    },

    #[error("Failed to open {mode} receiver for {topic}/{subscription}")]
    ClientOpen {
        topic: String,
        subscription: String,
        mode: ReceiveMode,
        #[source]
        source: BrokerError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Receive failed")]
    Receive(#[source] BrokerError),

    #[error("Settlement failed")]
    Settlement(#[source] BrokerError),

    #[error("Consumer is closed")]
    Closed,
}

impl ConsumerError {
    /// Create provisioning error
    pub fn provisioning(topic: &str, subscription: &str, source: BrokerError) -> Self {
        Self::Provisioning {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            source,
        }
    }

    /// Create client open error
    pub fn client_open(
        topic: &str,
        subscription: &str,
        mode: ReceiveMode,
        source: BrokerError,
    ) -> Self {
        Self::ClientOpen {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            mode,
            source,
        }
    }

    /// Broker error underlying this failure, if any
    pub fn broker_error(&self) -> Option<&BrokerError> {
        match self {
            ConsumerError::Provisioning { source, .. }
            | ConsumerError::ClientOpen { source, .. }
            | ConsumerError::Receive(source)
            | ConsumerError::Settlement(source) => Some(source),
            ConsumerError::Config(_) | ConsumerError::Closed => None,
        }
    }

    /// Full error chain, safe to log or show to operators
    pub fn sanitized_message(&self) -> String {
        let mut message = self.to_string();
        if let Some(source) = self.broker_error() {
            message = format!("{message}: {source}");
        }
        sanitize_error_message(&message)
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(sharedaccesskey|sharedaccesssignature|password|token|key|secret|sig)\s*[=:]\s*[^;&\s]+")
        .expect("secret pattern is valid")
});

/// Sanitize error messages so credentials never reach logs
///
/// Masks `key=value` pairs whose key looks like a credential and caps the
/// result at 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;
