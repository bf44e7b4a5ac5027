//! Per-broker credential resolution.

use std::collections::HashMap;

use bridge_client::{BrokerId, Credentials};
use serde::Deserialize;

/// Key of the fallback entry used when a broker id has no dedicated
/// credentials.
pub const DEFAULT_CREDENTIALS_KEY: &str = "default";

/// Credentials keyed by broker id, with a `"default"` fallback entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    entries: HashMap<String, Credentials>,
}

impl CredentialSet {
    /// Build a set from preresolved entries.
    pub fn new(entries: HashMap<String, Credentials>) -> Self {
        Self { entries }
    }

    /// Add or replace the entry for `key` (a broker id or `"default"`).
    pub fn insert(&mut self, key: impl Into<String>, credentials: Credentials) {
        self.entries.insert(key.into(), credentials);
    }

    /// Resolve credentials for a broker id, falling back to the default
    /// entry. `None` means neither exists.
    pub fn resolve(&self, broker_id: &BrokerId) -> Option<&Credentials> {
        self.entries
            .get(broker_id.as_str())
            .or_else(|| self.entries.get(DEFAULT_CREDENTIALS_KEY))
    }
}
