//! # bridge-core
//!
//! The core of the MQTT bridge: a connection cache with single-flight
//! connect semantics, a bridge from callback-delivered messages to a push
//! event stream, and the stateless publish path. Everything network-facing
//! happens behind the seams in `bridge-client` and `bridge-store`; this
//! crate owns the concurrency coordination, resource lifecycle, and failure
//! classification.

mod cache;
mod config;
mod credentials;
mod error;
mod publish;
mod stream;

pub use cache::{ConnectionCache, ConnectionProvider};
pub use config::BridgeConfig;
pub use credentials::{CredentialSet, DEFAULT_CREDENTIALS_KEY};
pub use error::{BridgeError, Result};
pub use publish::MessagePublisher;
pub use stream::{ErrorCode, StreamBridge, StreamEvent};
