//! Configuration for the bridge core components.

use std::time::Duration;

use bridge_client::QoS;

use crate::error::{BridgeError, Result};

/// Timeouts and intervals governing the cache, stream bridge, and publish
/// path.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bound on one broker connect attempt
    /// Default: 7 seconds
    pub connect_timeout: Duration,

    /// Bound on one subscribe acknowledgement
    /// Default: 5 seconds
    pub subscribe_timeout: Duration,

    /// Bound on the best-effort unsubscribe during stream teardown
    /// Default: 2 seconds
    pub unsubscribe_timeout: Duration,

    /// Bound on one publish acknowledgement
    /// Default: 8 seconds
    pub publish_timeout: Duration,

    /// Interval between keep-alive frames on an open stream
    /// Default: 10 seconds
    pub heartbeat_interval: Duration,

    /// Overall lifetime bound for one stream; `None` leaves streams open
    /// until the consumer disconnects
    /// Default: None
    pub stream_timeout: Option<Duration>,

    /// QoS used when a publish request does not specify one
    /// Default: at-least-once
    pub default_qos: QoS,

    /// Retain flag used when a publish request does not specify one
    /// Default: false
    pub default_retain: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(7),
            subscribe_timeout: Duration::from_secs(5),
            unsubscribe_timeout: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(8),
            heartbeat_interval: Duration::from_secs(10),
            stream_timeout: None,
            default_qos: QoS::AtLeastOnce,
            default_retain: false,
        }
    }
}

impl BridgeConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout == Duration::ZERO {
            return Err(BridgeError::Config(
                "connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.subscribe_timeout == Duration::ZERO {
            return Err(BridgeError::Config(
                "subscribe timeout must be greater than 0".to_string(),
            ));
        }
        if self.publish_timeout == Duration::ZERO {
            return Err(BridgeError::Config(
                "publish timeout must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_interval == Duration::ZERO {
            return Err(BridgeError::Config(
                "heartbeat interval must be greater than 0".to_string(),
            ));
        }
        if let Some(stream_timeout) = self.stream_timeout {
            if stream_timeout <= self.heartbeat_interval {
                return Err(BridgeError::Config(
                    "stream timeout must exceed the heartbeat interval".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }
}
