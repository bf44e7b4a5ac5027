//! Error types for the broker client seam.

use std::time::Duration;

/// Errors surfaced by broker connectors and connections.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The broker rejected the connection or the transport failed during connect
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connect attempt did not complete within the allowed time
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The publish request failed or was never acknowledged
    #[error("publish failed: {0}")]
    Publish(String),

    /// The subscribe request failed or was never acknowledged
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The unsubscribe request failed or was never acknowledged
    #[error("unsubscribe failed: {0}")]
    Unsubscribe(String),

    /// The topic filter is not a valid MQTT filter
    #[error("invalid topic filter: {0}")]
    InvalidFilter(String),
}

/// Convenience type alias for Results using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
