//! # bridge-store
//!
//! Broker configuration store for the MQTT bridge.
//!
//! A broker configuration is `{id, host, port}`; records are created through
//! an upsert keyed on host name (one configuration per broker host) and
//! addressed by a store-minted id afterwards. `MemoryStore` backs tests and
//! development, `SledStore` backs the service.

mod error;
mod memory;
mod record;
mod sled_store;

use async_trait::async_trait;
use bridge_client::{BrokerDescriptor, BrokerId};

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use record::BrokerRecord;
pub use sled_store::SledStore;

/// Persistence seam for broker configurations.
///
/// The connection cache resolves descriptors through `get`; the HTTP CRUD
/// surface uses the full contract.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Resolve a broker configuration by id.
    async fn get(&self, id: &BrokerId) -> Result<Option<BrokerDescriptor>>;

    /// Insert a configuration for `host`, or update the port of the existing
    /// one. Returns the id of the inserted or updated record.
    async fn upsert(&self, host: &str, port: u16) -> Result<BrokerId>;

    /// List every stored configuration.
    async fn list(&self) -> Result<Vec<BrokerDescriptor>>;

    /// Delete a configuration by id. Returns whether a record existed.
    async fn delete(&self, id: &BrokerId) -> Result<bool>;
}
