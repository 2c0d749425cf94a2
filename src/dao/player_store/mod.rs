/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};

use crate::dao::models::{Identity, OfflineLookup, PersistedRecord, PlayerSnapshot};
use crate::dao::storage::{StorageError, StorageResult};

pub use memory::InMemoryPlayerStore;

/// Abstraction over the persistence layer holding player records.
pub trait PlayerStore: Send + Sync {
    /// Read the record of `identity`, synthesizing an empty one when the store has none.
    fn load_record(&self, identity: Identity) -> BoxFuture<'static, StorageResult<PersistedRecord>>;
    /// Overwrite the whole record of `identity` with the live snapshot.
    fn save_record(
        &self,
        identity: Identity,
        name: String,
        snapshot: PlayerSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Resolve a stored record for offline editing. `Ok(None)` when nothing is stored for the
    /// identity or nothing matches the name hint; records are never synthesized here.
    fn load_offline_record(
        &self,
        lookup: OfflineLookup,
    ) -> BoxFuture<'static, StorageResult<Option<PersistedRecord>>>;
    /// Persist only main inventory, armor and off-hand of `record`.
    fn save_offline_main_inventory(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Persist only the ender storage of `record`.
    fn save_offline_ender_storage(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Swappable holder for the installed store; empty means degraded mode.
pub struct StoreSlot {
    store: RwLock<Option<Arc<dyn PlayerStore>>>,
    degraded: watch::Sender<bool>,
}

impl StoreSlot {
    /// Empty slot, starting in degraded mode.
    pub fn new() -> Arc<Self> {
        let (degraded, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded,
        })
    }

    /// Slot with a store already installed.
    pub fn with_store(store: Arc<dyn PlayerStore>) -> Arc<Self> {
        let (degraded, _rx) = watch::channel(false);
        Arc::new(Self {
            store: RwLock::new(Some(store)),
            degraded,
        })
    }

    /// Current store, if one is installed.
    pub async fn get(&self) -> Option<Arc<dyn PlayerStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store or [`StorageError::Degraded`].
    pub async fn require(&self) -> StorageResult<Arc<dyn PlayerStore>> {
        self.get().await.ok_or(StorageError::Degraded)
    }

    /// Install a store and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn PlayerStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
