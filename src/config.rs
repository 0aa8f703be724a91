//! Consumer configuration
//!
//! A [`ConsumerConfiguration`] names the broker namespace (through a
//! connection string or the env var holding one), the topic and
//! subscription to consume from, and the creation-time settings applied if
//! the subscription has to be provisioned.

use crate::broker::types::{SqlFilter, DEFAULT_TIME_TO_EXPIRE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_TOPIC_LEN: usize = 260;
const MAX_SUBSCRIPTION_LEN: usize = 50;

/// Settings for building one consumer
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerConfiguration {
    /// Literal connection string (prefer `connection_string_env` outside tests)
    #[serde(default, skip_serializing)]
    pub connection_string: Option<String>,
    /// Environment variable containing the connection string
    #[serde(default)]
    pub connection_string_env: Option<String>,
    /// Topic path the subscription hangs off
    pub topic: String,
    /// Subscription name under `topic`
    pub subscription: String,
    /// Default message time-to-live for a newly created subscription (default: 4 days)
    #[serde(default)]
    pub time_to_expire_secs: Option<u64>,
    /// Optional filter predicate attached when the subscription is created
    #[serde(default)]
    pub filter: Option<String>,
}

impl fmt::Debug for ConsumerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfiguration")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "***"),
            )
            .field("connection_string_env", &self.connection_string_env)
            .field("topic", &self.topic)
            .field("subscription", &self.subscription)
            .field("time_to_expire_secs", &self.time_to_expire_secs)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("Invalid entity name: {0}")]
    InvalidEntityName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConsumerConfiguration {
    /// Configuration reading its connection string from `connection_string_env`
    pub fn new(connection_string_env: &str, topic: &str, subscription: &str) -> Self {
        Self {
            connection_string: None,
            connection_string_env: Some(connection_string_env.to_string()),
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            time_to_expire_secs: None,
            filter: None,
        }
    }

    /// Configuration carrying a literal connection string
    pub fn with_connection_string(connection_string: &str, topic: &str, subscription: &str) -> Self {
        Self {
            connection_string: Some(connection_string.to_string()),
            connection_string_env: None,
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            time_to_expire_secs: None,
            filter: None,
        }
    }

    pub fn time_to_expire_secs(mut self, secs: u64) -> Self {
        self.time_to_expire_secs = Some(secs);
        self
    }

    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    /// Load configuration from a TOML file and validate it
    ///
    /// The connection string env var is not resolved here; see
    /// [`ConsumerConfiguration::connection_string`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ConsumerConfiguration = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate entity names, credential source and TTL
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.connection_string, &self.connection_string_env) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidConfig(
                    "set only one of connection_string and connection_string_env".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::InvalidConfig(
                    "one of connection_string or connection_string_env is required".to_string(),
                ));
            }
            _ => {}
        }

        validate_topic_name(&self.topic)?;
        validate_subscription_name(&self.subscription)?;

        if self.time_to_expire_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "time_to_expire_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve and parse the connection string
    pub fn connection_string(&self) -> Result<ConnectionString, ConfigError> {
        let raw = match (&self.connection_string, &self.connection_string_env) {
            (Some(literal), _) => literal.clone(),
            (None, Some(env_name)) => std::env::var(env_name)
                .map_err(|_| ConfigError::EnvVarNotFound(env_name.clone()))?,
            (None, None) => {
                return Err(ConfigError::InvalidConfig(
                    "no connection string source configured".to_string(),
                ));
            }
        };
        raw.parse()
    }

    /// Configured time-to-live, if any
    pub fn time_to_expire(&self) -> Option<Duration> {
        self.time_to_expire_secs.map(Duration::from_secs)
    }

    /// Time-to-live a newly created subscription would get
    pub fn effective_time_to_expire(&self) -> Duration {
        self.time_to_expire().unwrap_or(DEFAULT_TIME_TO_EXPIRE)
    }

    /// Filter to attach on creation; `None` when unset or blank
    pub fn sql_filter(&self) -> Option<SqlFilter> {
        SqlFilter::from_optional(self.filter.as_deref())
    }
}

/// Validate a topic path: `[A-Za-z0-9._/-]+`, no leading/trailing slash
fn validate_topic_name(topic: &str) -> Result<(), ConfigError> {
    let valid_chars = topic
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'));

    if topic.is_empty()
        || topic.len() > MAX_TOPIC_LEN
        || !valid_chars
        || topic.starts_with('/')
        || topic.ends_with('/')
    {
        return Err(ConfigError::InvalidEntityName(format!(
            "Topic '{topic}' must match [a-zA-Z0-9._/-]{{1,{MAX_TOPIC_LEN}}} without leading or trailing '/'"
        )));
    }

    Ok(())
}

/// Validate a subscription name: `[A-Za-z0-9._-]{1,50}`
fn validate_subscription_name(subscription: &str) -> Result<(), ConfigError> {
    let valid_chars = subscription
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if subscription.is_empty() || subscription.len() > MAX_SUBSCRIPTION_LEN || !valid_chars {
        return Err(ConfigError::InvalidEntityName(format!(
            "Subscription '{subscription}' must match [a-zA-Z0-9._-]{{1,{MAX_SUBSCRIPTION_LEN}}}"
        )));
    }

    Ok(())
}

/// Shared-access credential carried by a connection string
#[derive(Clone, PartialEq, Eq)]
pub enum SasCredential {
    /// Key name plus key, used to mint tokens
    Key { name: String, key: String },
    /// Pre-minted shared access signature
    Signature(String),
}

impl fmt::Debug for SasCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SasCredential::Key { name, .. } => f
                .debug_struct("Key")
                .field("name", name)
                .field("key", &"***")
                .finish(),
            SasCredential::Signature(_) => f.debug_tuple("Signature").field(&"***").finish(),
        }
    }
}

/// Parsed `Endpoint=...;SharedAccessKeyName=...;SharedAccessKey=...` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: Url,
    pub credential: SasCredential,
    pub entity_path: Option<String>,
}

impl ConnectionString {
    /// Namespace host name, e.g. `contoso.servicebus.windows.net`
    pub fn namespace(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }
}

impl FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut signature = None;
        let mut entity_path = None;

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            // Segment text may be a secret, keep it out of the error
            let (name, value) = segment.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString("segment without '='".to_string())
            })?;
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(value),
                "sharedaccesssignature" => signature = Some(value),
                "entitypath" => entity_path = Some(value),
                // Unknown keys (e.g. TransportType) are tolerated
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing Endpoint".to_string()))?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidConnectionString(format!("Endpoint '{endpoint}': {e}"))
        })?;
        if !matches!(endpoint.scheme(), "sb" | "amqps" | "https") {
            return Err(ConfigError::InvalidConnectionString(format!(
                "unsupported Endpoint scheme '{}'",
                endpoint.scheme()
            )));
        }
        if endpoint.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidConnectionString(
                "Endpoint has no host".to_string(),
            ));
        }

        let credential = match (key_name, key, signature) {
            (_, _, Some(sig)) if !sig.is_empty() => SasCredential::Signature(sig),
            (Some(name), Some(key), None) if !name.is_empty() && !key.is_empty() => {
                SasCredential::Key { name, key }
            }
            _ => {
                return Err(ConfigError::InvalidConnectionString(
                    "requires SharedAccessKeyName and SharedAccessKey, or SharedAccessSignature"
                        .to_string(),
                ));
            }
        };

        Ok(ConnectionString {
            endpoint,
            credential,
            entity_path: entity_path.filter(|p| !p.is_empty()),
        })
    }
}

impl fmt::Display for ConnectionString {
    /// Renders the connection string with the secret redacted
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint={}", self.endpoint)?;
        match &self.credential {
            SasCredential::Key { name, .. } => {
                write!(f, ";SharedAccessKeyName={name};SharedAccessKey=***")?
            }
            SasCredential::Signature(_) => write!(f, ";SharedAccessSignature=***")?,
        }
        if let Some(path) = &self.entity_path {
            write!(f, ";EntityPath={path}")?;
        }
        Ok(())
    }
}
