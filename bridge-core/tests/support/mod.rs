//! Mock connector, connection, store, and provider implementations for
//! exercising the bridge core without a real broker.
//!
//! The mocks support configurable failure modes and delays to drive error
//! and race paths, and count invocations so tests can assert on exactly how
//! often the seams were crossed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_client::{
    BrokerConnection, BrokerConnector, BrokerDescriptor, BrokerId, ClientError, Credentials,
    MessageDelivery, MessageSink, QoS,
};
use bridge_core::{BridgeError, ConnectionProvider, CredentialSet};
use bridge_store::{ConfigStore, StoreError};

/// One recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock broker connection with configurable failure modes.
pub struct MockConnection {
    connected: AtomicBool,
    pub publishes: Mutex<Vec<PublishedMessage>>,
    pub subscribe_count: AtomicUsize,
    pub unsubscribe_count: AtomicUsize,
    pub fail_subscribe: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    pub fail_publish: AtomicBool,
    pub publish_delay: Mutex<Option<Duration>>,
    sink: Mutex<Option<Arc<dyn MessageSink>>>,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            publishes: Mutex::new(Vec::new()),
            subscribe_count: AtomicUsize::new(0),
            unsubscribe_count: AtomicUsize::new(0),
            fail_subscribe: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            publish_delay: Mutex::new(None),
            sink: Mutex::new(None),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock().unwrap() = Some(delay);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.publishes.lock().unwrap().clone()
    }

    /// Deliver a message through the registered sink, as the broker's
    /// delivery task would.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.on_message(MessageDelivery {
                topic: topic.to_string(),
                payload: bytes::Bytes::copy_from_slice(payload),
            });
        }
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        let delay = *self.publish_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ClientError::Publish("mock publish failure".to_string()));
        }
        self.publishes.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        _filter: &str,
        _qos: QoS,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), ClientError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ClientError::Subscribe("mock subscribe failure".to_string()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn unsubscribe(&self, _filter: &str, _timeout: Duration) -> Result<(), ClientError> {
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(ClientError::Unsubscribe(
                "mock unsubscribe failure".to_string(),
            ));
        }
        *self.sink.lock().unwrap() = None;
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Mock connector producing one fresh [`MockConnection`] per connect call.
pub struct MockConnector {
    pub connect_count: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub connect_delay: Mutex<Option<Duration>>,
    pub connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_count: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            connect_delay: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn clear_connect_delay(&self) {
        *self.connect_delay.lock().unwrap() = None;
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn last_connection(&self) -> Arc<MockConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .expect("no connection was created")
            .clone()
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(
        &self,
        _descriptor: &BrokerDescriptor,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Arc<dyn BrokerConnection>, ClientError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Connect("mock broker refused".to_string()));
        }
        let connection = MockConnection::new();
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }
}

/// Read-only store preloaded with descriptors.
pub struct StaticStore {
    descriptors: HashMap<String, BrokerDescriptor>,
}

impl StaticStore {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            descriptors: HashMap::new(),
        })
    }

    pub fn with(id: &str, host: &str, port: u16) -> Arc<Self> {
        Self::with_entries(&[(id, host, port)])
    }

    pub fn with_entries(entries: &[(&str, &str, u16)]) -> Arc<Self> {
        let mut descriptors = HashMap::new();
        for (id, host, port) in entries {
            descriptors.insert(
                id.to_string(),
                BrokerDescriptor::new(BrokerId::new(*id), *host, *port),
            );
        }
        Arc::new(Self { descriptors })
    }
}

#[async_trait]
impl ConfigStore for StaticStore {
    async fn get(&self, id: &BrokerId) -> Result<Option<BrokerDescriptor>, StoreError> {
        Ok(self.descriptors.get(id.as_str()).cloned())
    }

    async fn upsert(&self, _host: &str, _port: u16) -> Result<BrokerId, StoreError> {
        Err(StoreError::Backend("read-only test store".to_string()))
    }

    async fn list(&self) -> Result<Vec<BrokerDescriptor>, StoreError> {
        Ok(self.descriptors.values().cloned().collect())
    }

    async fn delete(&self, _id: &BrokerId) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Credential set with only the default entry, enough for every broker id.
pub fn default_credentials() -> Arc<CredentialSet> {
    let mut entries = HashMap::new();
    entries.insert(
        "default".to_string(),
        Credentials::new("bridge", "bridge-pw"),
    );
    Arc::new(CredentialSet::new(entries))
}

/// Provider double that skips the cache entirely.
pub struct MockProvider {
    pub connection: Mutex<Option<Arc<MockConnection>>>,
    pub error: Mutex<Option<BridgeError>>,
    pub acquire_count: AtomicUsize,
    pub evict_count: AtomicUsize,
}

impl MockProvider {
    pub fn with_connection(connection: Arc<MockConnection>) -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(Some(connection)),
            error: Mutex::new(None),
            acquire_count: AtomicUsize::new(0),
            evict_count: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: BridgeError) -> Arc<Self> {
        Arc::new(Self {
            connection: Mutex::new(None),
            error: Mutex::new(Some(error)),
            acquire_count: AtomicUsize::new(0),
            evict_count: AtomicUsize::new(0),
        })
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for MockProvider {
    async fn acquire(
        &self,
        _broker_id: &BrokerId,
    ) -> Result<Arc<dyn BrokerConnection>, BridgeError> {
        self.acquire_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        let connection = self
            .connection
            .lock()
            .unwrap()
            .clone()
            .expect("mock provider has no connection");
        Ok(connection)
    }

    async fn evict(&self, _broker_id: &BrokerId) {
        self.evict_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn evict_all(&self) {
        self.evict_count.fetch_add(1, Ordering::SeqCst);
    }
}
