//! Error taxonomy for the bridge core.

use bridge_client::BrokerId;

/// Errors produced by the connection cache, stream bridge, and publish path.
///
/// The enum is `Clone` because a single-flight connect outcome is shared by
/// every waiter that joined the attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// No broker configuration exists for the requested id
    #[error("no broker configuration found for id {broker_id}")]
    ConfigNotFound {
        /// The id that failed to resolve
        broker_id: BrokerId,
    },

    /// The configuration is unusable (e.g. no credentials and no default entry)
    #[error("broker configuration error: {0}")]
    Config(String),

    /// The connect attempt did not complete within the allowed time
    #[error("timed out connecting to broker {broker_id}")]
    ConnectTimeout {
        /// The id of the broker that timed out
        broker_id: BrokerId,
    },

    /// The broker or transport rejected the connection
    #[error("broker connection failed: {0}")]
    ConnectFailure(String),

    /// The subscribe request failed or timed out
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The publish request failed or timed out
    #[error("publish failed: {0}")]
    Publish(String),

    /// The payload could not be serialized
    #[error("payload serialization failed: {0}")]
    Serialization(String),

    /// An unsubscribe attempt failed; only ever logged during teardown
    #[error("unsubscribe failed: {0}")]
    Unsubscribe(String),
}

impl BridgeError {
    /// Whether this failure is the caller's fault (HTTP 4xx) as opposed to a
    /// transient transport condition (HTTP 5xx).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::Config(_) | Self::Serialization(_)
        )
    }

    /// Whether this failure identifies a missing broker configuration.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound { .. })
    }
}

/// Convenience type alias for Results using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let not_found = BridgeError::ConfigNotFound {
            broker_id: BrokerId::new("7"),
        };
        assert!(not_found.is_input_error());
        assert!(not_found.is_not_found());

        assert!(BridgeError::Config("no credentials".to_string()).is_input_error());
        assert!(BridgeError::Serialization("bad payload".to_string()).is_input_error());

        let timeout = BridgeError::ConnectTimeout {
            broker_id: BrokerId::new("7"),
        };
        assert!(!timeout.is_input_error());
        assert!(!timeout.is_not_found());
        assert!(!BridgeError::ConnectFailure("refused".to_string()).is_input_error());
        assert!(!BridgeError::Publish("timed out".to_string()).is_input_error());
    }

    #[test]
    fn display_carries_the_broker_id() {
        let err = BridgeError::ConfigNotFound {
            broker_id: BrokerId::new("42"),
        };
        assert!(err.to_string().contains("42"));
    }
}
