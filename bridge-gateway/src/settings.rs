//! Gateway configuration, loaded from an optional `bridge.toml` plus
//! `BRIDGE_`-prefixed environment variables (`BRIDGE_SERVER__PORT=8080`).

use std::net::SocketAddr;
use std::time::Duration;

use bridge_client::{QoS, RumqttOptions};
use bridge_core::{BridgeConfig, CredentialSet};
use serde::Deserialize;

/// Top-level configuration for the gateway process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub store: StoreSettings,
    /// Credentials keyed by broker id, plus the `default` fallback entry.
    #[serde(default)]
    pub credentials: CredentialSet,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Timeouts and MQTT behavior knobs, in the units operators expect.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub connect_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub unsubscribe_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// 0 disables the overall stream lifetime bound
    pub stream_timeout_ms: u64,
    pub keep_alive_secs: u64,
    pub publisher_qos: u8,
    pub publisher_retain: bool,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 7_000,
            subscribe_timeout_ms: 5_000,
            unsubscribe_timeout_ms: 2_000,
            publish_timeout_ms: 8_000,
            heartbeat_interval_ms: 10_000,
            stream_timeout_ms: 0,
            keep_alive_secs: 30,
            publisher_qos: 1,
            publisher_retain: false,
        }
    }
}

/// Persistent store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "bridge_db".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `bridge.toml` (optional) overlaid with
    /// `BRIDGE_`-prefixed environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("bridge").required(false))
            .add_source(config::Environment::with_prefix("BRIDGE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// The listener address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Core timeouts derived from these settings.
    ///
    /// An unknown publisher QoS code falls back to at-least-once.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            connect_timeout: Duration::from_millis(self.mqtt.connect_timeout_ms),
            subscribe_timeout: Duration::from_millis(self.mqtt.subscribe_timeout_ms),
            unsubscribe_timeout: Duration::from_millis(self.mqtt.unsubscribe_timeout_ms),
            publish_timeout: Duration::from_millis(self.mqtt.publish_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.mqtt.heartbeat_interval_ms),
            stream_timeout: (self.mqtt.stream_timeout_ms > 0)
                .then(|| Duration::from_millis(self.mqtt.stream_timeout_ms)),
            default_qos: QoS::from_code(self.mqtt.publisher_qos).unwrap_or(QoS::AtLeastOnce),
            default_retain: self.mqtt.publisher_retain,
        }
    }

    /// Transport tunables for the rumqttc connector.
    pub fn rumqtt_options(&self) -> RumqttOptions {
        RumqttOptions {
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            ..RumqttOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_produce_a_valid_config() {
        let settings = Settings::default();
        let config = settings.bridge_config();

        assert_eq!(config.connect_timeout, Duration::from_secs(7));
        assert_eq!(config.publish_timeout, Duration::from_secs(8));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert!(config.stream_timeout.is_none());
        assert_eq!(config.default_qos, QoS::AtLeastOnce);
        assert!(!config.default_retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_stream_timeout_means_unbounded() {
        let mut settings = Settings::default();
        settings.mqtt.stream_timeout_ms = 0;
        assert!(settings.bridge_config().stream_timeout.is_none());

        settings.mqtt.stream_timeout_ms = 60_000;
        assert_eq!(
            settings.bridge_config().stream_timeout,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn unknown_qos_code_falls_back_to_at_least_once() {
        let mut settings = Settings::default();
        settings.mqtt.publisher_qos = 9;
        assert_eq!(settings.bridge_config().default_qos, QoS::AtLeastOnce);
    }

    #[test]
    fn bind_addr_parses() {
        let settings = Settings::default();
        let addr = settings.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
