//! Publish path behavior: serialization, classification, and the exact
//! arguments handed to the broker connection.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bridge_client::{BrokerId, QoS};
use bridge_core::{BridgeConfig, BridgeError, MessagePublisher};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::json;
use support::{MockConnection, MockProvider};

struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("refuses to serialize"))
    }
}

#[tokio::test]
async fn publish_passes_qos_retain_and_payload_bytes() {
    let connection = MockConnection::new();
    let provider = MockProvider::with_connection(Arc::clone(&connection));
    let publisher = MessagePublisher::new(provider, BridgeConfig::default());

    let payload = json!({"x": 1});
    publisher
        .publish(
            &BrokerId::new("3"),
            "a/b",
            &payload,
            Some(QoS::AtLeastOnce),
            Some(true),
        )
        .await
        .unwrap();

    let published = connection.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "a/b");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert!(published[0].retain);
    assert_eq!(published[0].payload, serde_json::to_vec(&payload).unwrap());
}

#[tokio::test]
async fn omitted_qos_and_retain_fall_back_to_defaults() {
    let connection = MockConnection::new();
    let provider = MockProvider::with_connection(Arc::clone(&connection));
    let publisher = MessagePublisher::new(provider, BridgeConfig::default());

    publisher
        .publish(&BrokerId::new("3"), "a/b", &json!({}), None, None)
        .await
        .unwrap();

    let published = connection.published();
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert!(!published[0].retain);
}

#[tokio::test]
async fn serialization_failure_is_an_input_error_and_skips_acquire() {
    let connection = MockConnection::new();
    let provider = MockProvider::with_connection(Arc::clone(&connection));
    let provider_seam: Arc<dyn bridge_core::ConnectionProvider> = provider.clone();
    let publisher = MessagePublisher::new(provider_seam, BridgeConfig::default());

    let err = publisher
        .publish(&BrokerId::new("3"), "a/b", &Unserializable, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Serialization(_)));
    assert!(err.is_input_error());
    assert_eq!(provider.acquire_count(), 0);
    assert!(connection.published().is_empty());
}

#[tokio::test]
async fn acquire_failure_keeps_its_classification() {
    let provider = MockProvider::failing(BridgeError::ConnectTimeout {
        broker_id: BrokerId::new("3"),
    });
    let publisher = MessagePublisher::new(provider, BridgeConfig::default());

    let err = publisher
        .publish(&BrokerId::new("3"), "a/b", &json!({}), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::ConnectTimeout { .. }));
    assert!(!err.is_input_error());
}

#[tokio::test]
async fn slow_publish_becomes_a_publish_error() {
    let connection = MockConnection::new();
    connection.set_publish_delay(Duration::from_millis(200));
    let provider = MockProvider::with_connection(Arc::clone(&connection));
    let config = BridgeConfig::default().with_publish_timeout(Duration::from_millis(50));
    let publisher = MessagePublisher::new(provider, config);

    let err = publisher
        .publish(&BrokerId::new("3"), "a/b", &json!({}), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Publish(_)));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn rejected_publish_becomes_a_publish_error() {
    let connection = MockConnection::new();
    connection.set_fail_publish(true);
    let provider = MockProvider::with_connection(Arc::clone(&connection));
    let publisher = MessagePublisher::new(provider, BridgeConfig::default());

    let err = publisher
        .publish(&BrokerId::new("3"), "a/b", &json!({}), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Publish(_)));
    assert!(!err.is_input_error());
}
