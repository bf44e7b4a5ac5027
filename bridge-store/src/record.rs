//! Stored representation of a broker configuration.

use bridge_client::{BrokerDescriptor, BrokerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One broker configuration as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRecord {
    /// Store-minted id, rendered as a decimal string in [`BrokerId`]
    pub id: u64,
    /// Broker host name, unique across records
    pub host: String,
    /// Broker port
    pub port: u16,
    /// When the record was first created
    pub created_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl BrokerRecord {
    /// Create a fresh record stamped with the current time.
    pub fn new(id: u64, host: impl Into<String>, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id,
            host: host.into(),
            port,
            created_at: now,
            updated_at: now,
        }
    }

    /// The record's id as a broker identity.
    pub fn broker_id(&self) -> BrokerId {
        BrokerId::new(self.id.to_string())
    }

    /// The record as the descriptor the connection cache consumes.
    pub fn descriptor(&self) -> BrokerDescriptor {
        BrokerDescriptor::new(self.broker_id(), self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_to_descriptor() {
        let record = BrokerRecord::new(42, "mq.test", 1883);
        let descriptor = record.descriptor();
        assert_eq!(descriptor.id.as_str(), "42");
        assert_eq!(descriptor.host, "mq.test");
        assert_eq!(descriptor.port, 1883);
        assert_eq!(record.created_at, record.updated_at);
    }
}
