//! Connection cache with single-flight connect semantics.
//!
//! One map entry per broker id, holding at most one of a connected handle or
//! an in-flight connect attempt. Every state transition happens under the
//! entry's shard lock, which is what makes eviction linearizable with
//! respect to in-flight connects: a connect that loses the race against
//! `evict` finds its token gone at the linearization point and discards the
//! handle it produced instead of caching it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_client::{BrokerConnection, BrokerConnector, BrokerId};
use bridge_store::ConfigStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::config::BridgeConfig;
use crate::credentials::CredentialSet;
use crate::error::{BridgeError, Result};

/// Narrow seam for obtaining and releasing broker connections.
///
/// The stream bridge and publish path depend on this trait, not on the
/// concrete cache, so test doubles can stand in at composition time.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Return a usable, connected handle for the broker, or a classified
    /// failure.
    async fn acquire(&self, broker_id: &BrokerId) -> Result<Arc<dyn BrokerConnection>>;

    /// Cancel any in-flight connect and disconnect the cached handle.
    /// Idempotent.
    async fn evict(&self, broker_id: &BrokerId);

    /// Evict every known broker id.
    async fn evict_all(&self);
}

type SharedConnect = Shared<BoxFuture<'static, Result<Arc<dyn BrokerConnection>>>>;

/// One in-flight connect attempt.
///
/// The token identifies the attempt so completion can tell "still current"
/// apart from "evicted and possibly superseded". The map entry holds a clone
/// of the shared future, so an attempt survives even if every current waiter
/// is cancelled: the next `acquire` resumes it.
#[derive(Clone)]
struct PendingConnect {
    token: u64,
    future: SharedConnect,
}

/// Cache slot for one broker id: a live handle or one connect in flight,
/// never both.
enum CacheEntry {
    Connected(Arc<dyn BrokerConnection>),
    Connecting(PendingConnect),
}

/// What `acquire` decided to do with an occupied slot, computed under the
/// shard lock.
enum SlotAction {
    UseConnected(Arc<dyn BrokerConnection>),
    JoinAttempt(PendingConnect),
    ReplaceStale,
}

/// Cache of live broker connections keyed by broker id.
///
/// Construction is tied to process lifetime and the instance is shared via
/// `Arc`; there is no hidden global. The map supports concurrent
/// read/insert/remove without any cache-wide lock, so unrelated broker ids
/// never serialize each other.
pub struct ConnectionCache {
    store: Arc<dyn ConfigStore>,
    connector: Arc<dyn BrokerConnector>,
    credentials: Arc<CredentialSet>,
    entries: Arc<DashMap<BrokerId, CacheEntry>>,
    next_token: AtomicU64,
    connect_timeout: Duration,
}

impl ConnectionCache {
    /// Create a cache over the given collaborators.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn BrokerConnector>,
        credentials: Arc<CredentialSet>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            store,
            connector,
            credentials,
            entries: Arc::new(DashMap::new()),
            next_token: AtomicU64::new(0),
            connect_timeout: config.connect_timeout,
        }
    }

    /// Number of currently cached connected handles.
    pub fn cached_connections(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.value(), CacheEntry::Connected(_)))
            .count()
    }

    fn new_attempt(&self, broker_id: &BrokerId) -> PendingConnect {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        PendingConnect {
            token,
            future: self.start_connect(broker_id.clone(), token),
        }
    }

    /// Start a new connect attempt and return its shared future.
    ///
    /// On completion the attempt revisits its slot under the shard lock: if
    /// the slot still carries this attempt's token, the outcome is installed
    /// (handle cached, or slot cleared on failure). A missing or replaced
    /// token means an eviction won the race; the freshly connected handle is
    /// disconnected so it can never be observed through the cache.
    fn start_connect(&self, broker_id: BrokerId, token: u64) -> SharedConnect {
        let store = Arc::clone(&self.store);
        let connector = Arc::clone(&self.connector);
        let credentials = Arc::clone(&self.credentials);
        let entries = Arc::clone(&self.entries);
        let connect_timeout = self.connect_timeout;

        async move {
            let outcome = connect_once(
                store,
                connector,
                credentials,
                broker_id.clone(),
                connect_timeout,
            )
            .await;

            // Linearization point: install or clear under the shard lock.
            let installed = match entries.entry(broker_id.clone()) {
                Entry::Occupied(mut occupied) => {
                    let is_current = matches!(
                        occupied.get(),
                        CacheEntry::Connecting(attempt) if attempt.token == token
                    );
                    if is_current {
                        match &outcome {
                            Ok(connection) => {
                                occupied.insert(CacheEntry::Connected(Arc::clone(connection)));
                            }
                            Err(_) => {
                                occupied.remove();
                            }
                        }
                    }
                    is_current
                }
                Entry::Vacant(_) => false,
            };

            match outcome {
                Ok(connection) => {
                    if installed {
                        debug!(broker_id = %broker_id, "caching connected handle");
                        Ok(connection)
                    } else {
                        info!(
                            broker_id = %broker_id,
                            "connect finished after eviction, discarding handle"
                        );
                        connection.disconnect().await;
                        Err(BridgeError::ConnectFailure(format!(
                            "connection to broker {broker_id} was evicted during connect"
                        )))
                    }
                }
                Err(err) => {
                    error!(broker_id = %broker_id, error = %err, "connect attempt failed");
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Resolve configuration and open one connection.
async fn connect_once(
    store: Arc<dyn ConfigStore>,
    connector: Arc<dyn BrokerConnector>,
    credentials: Arc<CredentialSet>,
    broker_id: BrokerId,
    connect_timeout: Duration,
) -> Result<Arc<dyn BrokerConnection>> {
    let descriptor = store
        .get(&broker_id)
        .await
        .map_err(|err| BridgeError::Config(format!("broker lookup failed: {err}")))?
        .ok_or_else(|| BridgeError::ConfigNotFound {
            broker_id: broker_id.clone(),
        })?;

    let creds = credentials
        .resolve(&broker_id)
        .ok_or_else(|| {
            BridgeError::Config(format!(
                "no credentials configured for broker {broker_id} and no default entry"
            ))
        })?
        .clone();

    debug!(
        broker_id = %broker_id,
        host = %descriptor.host,
        port = descriptor.port,
        "connecting to broker"
    );

    match tokio::time::timeout(
        connect_timeout,
        connector.connect(&descriptor, &creds, connect_timeout),
    )
    .await
    {
        Ok(Ok(connection)) => {
            info!(
                broker_id = %broker_id,
                host = %descriptor.host,
                port = descriptor.port,
                "connected to broker"
            );
            Ok(connection)
        }
        Ok(Err(err)) => Err(BridgeError::ConnectFailure(err.to_string())),
        Err(_) => Err(BridgeError::ConnectTimeout { broker_id }),
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionCache {
    async fn acquire(&self, broker_id: &BrokerId) -> Result<Arc<dyn BrokerConnection>> {
        // Fast path: a live cached handle short-circuits without creating an
        // in-flight attempt.
        if let Some(entry) = self.entries.get(broker_id) {
            if let CacheEntry::Connected(connection) = entry.value() {
                if connection.is_connected() {
                    return Ok(Arc::clone(connection));
                }
            }
        }

        // Slow path: join the in-flight attempt, replace a stale handle, or
        // become the one attempt. All of it is atomic per key via the entry
        // API's shard lock, so concurrent callers collapse into exactly one
        // connect and observe the same outcome.
        let attempt = match self.entries.entry(broker_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let action = match occupied.get() {
                    CacheEntry::Connected(connection) if connection.is_connected() => {
                        SlotAction::UseConnected(Arc::clone(connection))
                    }
                    CacheEntry::Connected(_) => SlotAction::ReplaceStale,
                    CacheEntry::Connecting(attempt) => SlotAction::JoinAttempt(attempt.clone()),
                };
                match action {
                    SlotAction::UseConnected(connection) => return Ok(connection),
                    SlotAction::JoinAttempt(attempt) => attempt,
                    SlotAction::ReplaceStale => {
                        debug!(broker_id = %broker_id, "replacing stale handle with a new connect");
                        let attempt = self.new_attempt(broker_id);
                        let stale = occupied.insert(CacheEntry::Connecting(attempt.clone()));
                        if let CacheEntry::Connected(connection) = stale {
                            tokio::spawn(async move { connection.disconnect().await });
                        }
                        attempt
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let attempt = self.new_attempt(broker_id);
                vacant.insert(CacheEntry::Connecting(attempt.clone()));
                attempt
            }
        };

        attempt.future.await
    }

    async fn evict(&self, broker_id: &BrokerId) {
        // Removing the slot cancels an in-flight attempt (its token is gone
        // at the linearization point) and unhooks a cached handle.
        if let Some((_, entry)) = self.entries.remove(broker_id) {
            match entry {
                CacheEntry::Connected(connection) => {
                    info!(broker_id = %broker_id, "evicting cached connection");
                    connection.disconnect().await;
                }
                CacheEntry::Connecting(_) => {
                    debug!(broker_id = %broker_id, "cancelled in-flight connect");
                }
            }
        }
    }

    async fn evict_all(&self) {
        let ids: Vec<BrokerId> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for broker_id in ids {
            self.evict(&broker_id).await;
        }
    }
}
