//! # bridge-client
//!
//! Broker client primitive for the MQTT bridge. This crate defines the narrow
//! async seams the bridge core talks through (`BrokerConnector`,
//! `BrokerConnection`, `MessageSink`) together with the identity and
//! credential types they exchange, and provides the production implementation
//! backed by `rumqttc`.
//!
//! The bridge core never speaks MQTT itself: reconnect-on-drop, packet
//! routing, and acknowledgement tracking all live behind `BrokerConnection`.

mod connection;
mod error;
mod rumqtt;
pub mod topic;
mod types;

pub use connection::{BrokerConnection, BrokerConnector, MessageSink};
pub use error::{ClientError, Result};
pub use rumqtt::{RumqttConnector, RumqttOptions};
pub use types::{BrokerDescriptor, BrokerId, Credentials, MessageDelivery, QoS};
