//! Core types exchanged across the broker client seam.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Unique identifier for a configured broker.
///
/// Identity is an opaque string; the config store mints ids from an integer
/// sequence, so numeric-looking ids like `"42"` are the common case.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerId(pub String);

impl BrokerId {
    /// Create a new broker id from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the broker id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BrokerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for BrokerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for BrokerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved network identity of a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerDescriptor {
    /// The configured broker id
    pub id: BrokerId,
    /// Host name or address of the broker
    pub host: String,
    /// MQTT port of the broker
    pub port: u16,
}

impl BrokerDescriptor {
    /// Create a new broker descriptor.
    pub fn new(id: BrokerId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

/// Authentication credentials for a broker connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// User name presented to the broker
    pub username: String,
    /// Password presented to the broker
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// MQTT delivery quality of service.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible
    AtLeastOnce,
    /// Assured single delivery
    ExactlyOnce,
}

impl QoS {
    /// Map a numeric QoS code to a level, if valid.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    /// Numeric code of this QoS level.
    pub fn code(&self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// One message delivered by a broker subscription.
#[derive(Debug, Clone)]
pub struct MessageDelivery {
    /// Topic the message was published on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Bytes,
}
