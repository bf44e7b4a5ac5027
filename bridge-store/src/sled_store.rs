//! Persistent configuration store backed by `sled`.
//!
//! Records live in a `brokers` tree keyed by the big-endian id, so scans
//! yield records in id order. A `broker-hosts` tree maps host name to id and
//! stands in for the unique host index the upsert contract needs.

use async_trait::async_trait;
use bridge_client::{BrokerDescriptor, BrokerId};
use chrono::Utc;
use sled::Db;
use tracing::debug;

use crate::error::Result;
use crate::record::BrokerRecord;
use crate::ConfigStore;

/// Sled-backed store.
pub struct SledStore {
    db: Db,
    records: sled::Tree,
    hosts: sled::Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let records = db.open_tree("brokers")?;
        let hosts = db.open_tree("broker-hosts")?;
        Ok(Self { db, records, hosts })
    }

    fn load(&self, id: u64) -> Result<Option<BrokerRecord>> {
        match self.records.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, record: &BrokerRecord) -> Result<()> {
        let raw = serde_json::to_vec(record)?;
        self.records.insert(record.id.to_be_bytes(), raw)?;
        self.hosts
            .insert(record.host.as_bytes(), record.id.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn host_index(&self, host: &str) -> Result<Option<u64>> {
        match self.hosts.get(host.as_bytes())? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                    crate::StoreError::Encoding(format!("corrupt host index entry for {host}"))
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").field("db", &"sled::Db").finish()
    }
}

#[async_trait]
impl ConfigStore for SledStore {
    async fn get(&self, id: &BrokerId) -> Result<Option<BrokerDescriptor>> {
        let Ok(numeric) = id.as_str().parse::<u64>() else {
            return Ok(None);
        };
        Ok(self.load(numeric)?.map(|record| record.descriptor()))
    }

    async fn upsert(&self, host: &str, port: u16) -> Result<BrokerId> {
        if let Some(id) = self.host_index(host)? {
            if let Some(mut record) = self.load(id)? {
                record.port = port;
                record.updated_at = Utc::now();
                self.persist(&record)?;
                debug!(host = %host, id = %id, "updated broker configuration");
                return Ok(record.broker_id());
            }
        }

        let id = self.db.generate_id()? + 1;
        let record = BrokerRecord::new(id, host, port);
        self.persist(&record)?;
        debug!(host = %host, id = %id, "created broker configuration");
        Ok(record.broker_id())
    }

    async fn list(&self) -> Result<Vec<BrokerDescriptor>> {
        let mut descriptors = Vec::new();
        for entry in self.records.iter() {
            let (_, raw) = entry?;
            let record: BrokerRecord = serde_json::from_slice(&raw)?;
            descriptors.push(record.descriptor());
        }
        Ok(descriptors)
    }

    async fn delete(&self, id: &BrokerId) -> Result<bool> {
        let Ok(numeric) = id.as_str().parse::<u64>() else {
            return Ok(false);
        };
        let Some(record) = self.load(numeric)? else {
            return Ok(false);
        };
        self.hosts.remove(record.host.as_bytes())?;
        self.records.remove(numeric.to_be_bytes())?;
        debug!(id = %numeric, "deleted broker configuration");
        Ok(true)
    }
}
