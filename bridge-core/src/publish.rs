//! Stateless publish path.

use std::sync::Arc;

use bridge_client::{BrokerId, QoS};
use serde::Serialize;
use tracing::{debug, error};

use crate::cache::ConnectionProvider;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Publishes one JSON payload per call through the shared connection cache.
pub struct MessagePublisher {
    connections: Arc<dyn ConnectionProvider>,
    config: BridgeConfig,
}

impl MessagePublisher {
    /// Create a publisher over a connection provider.
    pub fn new(connections: Arc<dyn ConnectionProvider>, config: BridgeConfig) -> Self {
        Self {
            connections,
            config,
        }
    }

    /// Serialize `payload` as JSON and publish it.
    ///
    /// `qos` and `retain` fall back to the configured defaults when absent.
    /// Serialization problems are input errors; acquisition failures keep
    /// their own classification; a slow or failed publish acknowledgement is
    /// a transient [`BridgeError::Publish`].
    pub async fn publish<T>(
        &self,
        broker_id: &BrokerId,
        topic: &str,
        payload: &T,
        qos: Option<QoS>,
        retain: Option<bool>,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(payload)
            .map_err(|err| BridgeError::Serialization(err.to_string()))?;

        let connection = self.connections.acquire(broker_id).await?;

        let qos = qos.unwrap_or(self.config.default_qos);
        let retain = retain.unwrap_or(self.config.default_retain);

        match tokio::time::timeout(
            self.config.publish_timeout,
            connection.publish(topic, bytes, qos, retain),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(
                    broker_id = %broker_id,
                    topic = %topic,
                    qos = qos.code(),
                    retain,
                    "published message"
                );
                Ok(())
            }
            Ok(Err(err)) => {
                error!(broker_id = %broker_id, topic = %topic, error = %err, "publish failed");
                Err(BridgeError::Publish(err.to_string()))
            }
            Err(_) => {
                error!(broker_id = %broker_id, topic = %topic, "publish timed out");
                Err(BridgeError::Publish(format!(
                    "publish to topic {topic} timed out after {:?}",
                    self.config.publish_timeout
                )))
            }
        }
    }
}
