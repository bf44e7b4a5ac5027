//! In-memory configuration store for tests and development.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bridge_client::{BrokerDescriptor, BrokerId};
use chrono::Utc;
use dashmap::DashMap;

use crate::error::Result;
use crate::record::BrokerRecord;
use crate::ConfigStore;

/// DashMap-backed store with a process-local id sequence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<u64, BrokerRecord>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by_host(&self, host: &str) -> Option<u64> {
        self.records
            .iter()
            .find(|entry| entry.value().host == host)
            .map(|entry| *entry.key())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, id: &BrokerId) -> Result<Option<BrokerDescriptor>> {
        let Ok(numeric) = id.as_str().parse::<u64>() else {
            return Ok(None);
        };
        Ok(self.records.get(&numeric).map(|r| r.descriptor()))
    }

    async fn upsert(&self, host: &str, port: u16) -> Result<BrokerId> {
        if let Some(id) = self.find_by_host(host) {
            if let Some(mut record) = self.records.get_mut(&id) {
                record.port = port;
                record.updated_at = Utc::now();
                return Ok(record.broker_id());
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = BrokerRecord::new(id, host, port);
        let broker_id = record.broker_id();
        self.records.insert(id, record);
        Ok(broker_id)
    }

    async fn list(&self) -> Result<Vec<BrokerDescriptor>> {
        let mut descriptors: Vec<BrokerDescriptor> = self
            .records
            .iter()
            .map(|entry| entry.value().descriptor())
            .collect();
        descriptors.sort_by_key(|d| d.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        Ok(descriptors)
    }

    async fn delete(&self, id: &BrokerId) -> Result<bool> {
        let Ok(numeric) = id.as_str().parse::<u64>() else {
            return Ok(false);
        };
        Ok(self.records.remove(&numeric).is_some())
    }
}
