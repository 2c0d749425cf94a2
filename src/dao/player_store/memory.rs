//! Process-local store used when no database is configured and by the test-suite.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{Identity, OfflineLookup, PersistedRecord, PlayerSnapshot},
    player_store::PlayerStore,
    storage::{StorageError, StorageResult},
};

/// Records kept in a concurrent map, with switches to simulate an outage or a slow backend.
#[derive(Clone, Default)]
pub struct InMemoryPlayerStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: DashMap<Identity, PersistedRecord>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    saves: AtomicUsize,
}

impl InMemoryPlayerStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful writes of any kind.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Stored record, bypassing the async interface.
    pub fn record(&self, identity: Identity) -> Option<PersistedRecord> {
        self.inner.records.get(&identity).map(|entry| entry.clone())
    }

    /// Seed a record directly.
    pub fn insert(&self, record: PersistedRecord) {
        self.inner.records.insert(record.identity, record);
    }

    async fn gate(&self) -> StorageResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory store switched off".into(),
                io::Error::new(io::ErrorKind::ConnectionRefused, "simulated outage"),
            ));
        }
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Option<PersistedRecord> {
        self.inner
            .records
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.clone())
    }

    /// Apply `update` to the stored record, creating it when absent.
    fn upsert_with(&self, identity: Identity, name: &str, update: impl FnOnce(&mut PersistedRecord)) {
        let mut entry = self
            .inner
            .records
            .entry(identity)
            .or_insert_with(|| PersistedRecord::absent(identity, name));
        update(entry.value_mut());
        entry.exists_in_database = true;
        entry.last_saved = Some(SystemTime::now());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
    }
}

impl PlayerStore for InMemoryPlayerStore {
    fn load_record(&self, identity: Identity) -> BoxFuture<'static, StorageResult<PersistedRecord>> {
        let store = self.clone();
        Box::pin(async move {
            store.gate().await?;
            Ok(store
                .record(identity)
                .unwrap_or_else(|| PersistedRecord::absent(identity, "")))
        })
    }

    fn save_record(
        &self,
        identity: Identity,
        name: String,
        snapshot: PlayerSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.gate().await?;
            store.upsert_with(identity, &name, |record| {
                record.name = name.clone();
                record.snapshot = snapshot.normalized();
            });
            Ok(())
        })
    }

    fn load_offline_record(
        &self,
        lookup: OfflineLookup,
    ) -> BoxFuture<'static, StorageResult<Option<PersistedRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            store.gate().await?;
            Ok(match lookup {
                OfflineLookup::Identity(identity) => store.record(identity),
                OfflineLookup::Name(name) => store.find_by_name(&name),
            })
        })
    }

    fn save_offline_main_inventory(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.gate().await?;
            let PersistedRecord {
                identity,
                name,
                snapshot,
                ..
            } = record;
            store.upsert_with(identity, &name, |stored| {
                stored.snapshot.inventory = snapshot.inventory;
                stored.snapshot.armor = snapshot.armor;
                stored.snapshot.offhand = snapshot.offhand;
                stored.snapshot = stored.snapshot.clone().normalized();
            });
            Ok(())
        })
    }

    fn save_offline_ender_storage(
        &self,
        record: PersistedRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.gate().await?;
            let PersistedRecord {
                identity,
                name,
                snapshot,
                ..
            } = record;
            store.upsert_with(identity, &name, |stored| {
                stored.snapshot.ender_storage = snapshot.ender_storage;
                stored.snapshot = stored.snapshot.clone().normalized();
            });
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.gate().await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.gate().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{ENDER_STORAGE_SIZE, ItemStack, MAIN_INVENTORY_SIZE};
    use uuid::Uuid;

    #[tokio::test]
    async fn unknown_identity_loads_as_absent_empty_record() {
        let store = InMemoryPlayerStore::new();
        let record = store.load_record(Uuid::new_v4()).await.unwrap();
        assert!(!record.exists_in_database);
        assert_eq!(record.snapshot.inventory.len(), MAIN_INVENTORY_SIZE);
        assert_eq!(record.snapshot.ender_storage.len(), ENDER_STORAGE_SIZE);
    }

    #[tokio::test]
    async fn unknown_identity_has_no_offline_record() {
        let store = InMemoryPlayerStore::new();
        let found = store
            .load_offline_record(OfflineLookup::Identity(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn offline_saves_only_touch_their_region() {
        let store = InMemoryPlayerStore::new();
        let id = Uuid::new_v4();
        let mut live = PlayerSnapshot::default();
        live.inventory[0] = Some(ItemStack::new("minecraft:bread", 5));
        live.ender_storage[3] = Some(ItemStack::new("minecraft:emerald", 9));
        store.save_record(id, "Alex".into(), live).await.unwrap();

        let mut edited = store.record(id).unwrap();
        edited.snapshot.inventory[0] = None;
        edited.snapshot.ender_storage[3] = None;
        store.save_offline_main_inventory(edited).await.unwrap();

        let stored = store.record(id).unwrap();
        assert_eq!(stored.snapshot.inventory[0], None);
        assert_eq!(
            stored.snapshot.ender_storage[3],
            Some(ItemStack::new("minecraft:emerald", 9))
        );
    }

    #[tokio::test]
    async fn name_lookup_is_case_insensitive() {
        let store = InMemoryPlayerStore::new();
        let id = Uuid::new_v4();
        store
            .save_record(id, "Notch".into(), PlayerSnapshot::default())
            .await
            .unwrap();

        let found = store
            .load_offline_record(OfflineLookup::Name("notch".into()))
            .await
            .unwrap();
        assert_eq!(found.map(|record| record.identity), Some(id));

        let missing = store
            .load_offline_record(OfflineLookup::Name("jeb_".into()))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let store = InMemoryPlayerStore::new();
        store.set_unavailable(true);
        assert!(store.load_record(Uuid::new_v4()).await.is_err());
        assert!(store.health_check().await.is_err());
        assert_eq!(store.save_count(), 0);
    }
}
