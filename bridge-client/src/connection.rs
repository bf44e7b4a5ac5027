//! Trait seams between the bridge core and the broker transport.
//!
//! The bridge core only ever sees these traits. The production implementation
//! lives in [`crate::rumqtt`]; tests substitute doubles at composition time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BrokerDescriptor, Credentials, MessageDelivery, QoS};

/// Factory for live broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a connection to the described broker and wait for the broker to
    /// accept it.
    ///
    /// `timeout` bounds the wait for the connection acknowledgement; a hang
    /// converts into [`crate::ClientError::ConnectTimeout`] rather than a
    /// pending operation. The returned handle stays valid across transport
    /// drops: the implementation reconnects internally and reports the truth
    /// through [`BrokerConnection::is_connected`].
    async fn connect(
        &self,
        descriptor: &BrokerDescriptor,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Arc<dyn BrokerConnection>>;
}

/// A live, shareable connection to one broker.
///
/// Handles are shared across arbitrarily many concurrent publish and
/// subscribe operations; every method takes `&self`.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Snapshot of the transport state. Callers must re-check this on every
    /// use rather than assume a previously healthy handle is still connected.
    fn is_connected(&self) -> bool;

    /// Publish one message and wait for the acknowledgement the negotiated
    /// QoS provides (none for at-most-once).
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()>;

    /// Subscribe to a topic filter, delivering matching messages to `sink`
    /// from the connection's own delivery context. Resolves on the subscribe
    /// acknowledgement.
    async fn subscribe(&self, filter: &str, qos: QoS, sink: Arc<dyn MessageSink>) -> Result<()>;

    /// Remove the subscription for `filter`, waiting at most `timeout` for
    /// the acknowledgement. Message delivery to the filter's sink stops
    /// before this returns.
    async fn unsubscribe(&self, filter: &str, timeout: Duration) -> Result<()>;

    /// Tear down the connection. Idempotent; pending acknowledgements fail.
    async fn disconnect(&self);
}

/// One-directional sink for callback-delivered messages.
///
/// Invoked from the connection's delivery task. Implementations must not
/// block and must serialize their own downstream writes; the delivery task
/// makes no scheduling promises beyond calling `on_message` once per
/// matching message.
pub trait MessageSink: Send + Sync {
    /// Handle one delivered message.
    fn on_message(&self, delivery: MessageDelivery);
}
