//! Editing the stored record of a player who is not connected to this node.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{Identity, OfflineLookup, PersistedRecord, Slot},
        player_store::StoreSlot,
        storage::StorageError,
    },
    state::{
        inventory_view::{RecordView, SlotOutOfRange, ViewKind},
        session::SessionRegistry,
    },
};

/// Errors raised by [`OfflineEditManager`].
#[derive(Debug, Error)]
pub enum OfflineEditError {
    /// No stored record for the lookup.
    #[error("no stored record matches `{0}`")]
    NotFound(OfflineLookup),
    /// The target is connected to this node; its live mirror is authoritative.
    #[error("player `{0}` is online on this node")]
    TargetOnline(Identity),
    /// Unknown or already closed edit id.
    #[error("offline edit `{0}` does not exist")]
    UnknownEdit(Uuid),
    /// Slot index outside the view.
    #[error(transparent)]
    Slot(#[from] SlotOutOfRange),
    /// The stored record could not be read.
    #[error("failed to read the stored record")]
    Load(#[source] StorageError),
    /// The store rejected the write; the editor is told when connected.
    #[error("failed to persist the offline edit of `{target}`")]
    Persist {
        /// Operator who opened the edit.
        editor: Identity,
        /// Player whose record was edited.
        target: Identity,
        /// Store failure.
        #[source]
        source: StorageError,
    },
}

/// One checked-out record and its editable view.
#[derive(Debug, Clone)]
pub struct OfflineEditSession {
    /// Edit id.
    pub id: Uuid,
    /// Operator who opened the edit.
    pub editor: Identity,
    /// Player whose record is edited.
    pub target: Identity,
    /// Record as read at checkout.
    pub record: PersistedRecord,
    /// Editable region.
    pub view: RecordView,
    /// Checkout time.
    pub opened_at: SystemTime,
}

/// What a commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing editable changed; the store was not called.
    Unchanged,
    /// The edited region was written to the store.
    Saved,
}

/// Open offline edits, keyed by edit id.
pub struct OfflineEditManager {
    store: Arc<StoreSlot>,
    sessions: Arc<SessionRegistry>,
    edits: DashMap<Uuid, OfflineEditSession>,
}

impl OfflineEditManager {
    /// Manager with no open edit.
    pub fn new(store: Arc<StoreSlot>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            sessions,
            edits: DashMap::new(),
        }
    }

    /// Resolve the target, read its record and open a view of `kind` over it.
    pub async fn checkout(
        &self,
        editor: Identity,
        lookup: OfflineLookup,
        kind: ViewKind,
    ) -> Result<OfflineEditSession, OfflineEditError> {
        if let OfflineLookup::Identity(target) = &lookup {
            self.ensure_offline(*target)?;
        }

        let store = self.store.require().await.map_err(OfflineEditError::Load)?;
        let record = store
            .load_offline_record(lookup.clone())
            .await
            .map_err(OfflineEditError::Load)?
            .filter(|record| record.exists_in_database)
            .ok_or(OfflineEditError::NotFound(lookup))?;
        self.ensure_offline(record.identity)?;

        let session = OfflineEditSession {
            id: Uuid::new_v4(),
            editor,
            target: record.identity,
            view: RecordView::open(kind, &record.snapshot),
            record,
            opened_at: SystemTime::now(),
        };
        info!(
            edit = %session.id,
            %editor,
            target = %session.target,
            view = ?kind,
            "offline edit opened"
        );
        self.edits.insert(session.id, session.clone());
        Ok(session)
    }

    /// Copy of the open edit `id`.
    pub fn get(&self, id: Uuid) -> Option<OfflineEditSession> {
        self.edits.get(&id).map(|edit| edit.clone())
    }

    /// Place `item` in view slot `index` of edit `id`.
    pub fn set_slot(&self, id: Uuid, index: usize, item: Slot) -> Result<(), OfflineEditError> {
        let mut edit = self
            .edits
            .get_mut(&id)
            .ok_or(OfflineEditError::UnknownEdit(id))?;
        edit.view.set(index, item)?;
        Ok(())
    }

    /// Write the editable region back and persist it. The edit is closed whatever the outcome.
    pub async fn commit(&self, id: Uuid) -> Result<(OfflineEditSession, CommitOutcome), OfflineEditError> {
        let (_, mut edit) = self
            .edits
            .remove(&id)
            .ok_or(OfflineEditError::UnknownEdit(id))?;

        if !edit.view.is_dirty() {
            debug!(edit = %id, target = %edit.target, "offline edit closed without changes");
            return Ok((edit, CommitOutcome::Unchanged));
        }
        self.ensure_offline(edit.target)?;

        edit.view.write_back(&mut edit.record.snapshot);
        let (editor, target) = (edit.editor, edit.target);
        let persist = async {
            let store = self.store.require().await?;
            match edit.view.kind() {
                ViewKind::Main => store.save_offline_main_inventory(edit.record.clone()).await,
                ViewKind::Ender => store.save_offline_ender_storage(edit.record.clone()).await,
            }
        };
        persist
            .await
            .map_err(|source| OfflineEditError::Persist {
                editor,
                target,
                source,
            })?;

        info!(edit = %id, %target, view = ?edit.view.kind(), "offline edit committed");
        Ok((edit, CommitOutcome::Saved))
    }

    /// Close edit `id` without writing. False when it was not open.
    pub fn abandon(&self, id: Uuid) -> bool {
        let removed = self.edits.remove(&id).is_some();
        if removed {
            debug!(edit = %id, "offline edit abandoned");
        }
        removed
    }

    /// Abandon every edit opened by `editor`.
    pub fn abandon_by_editor(&self, editor: Identity) -> usize {
        let before = self.edits.len();
        self.edits.retain(|_, edit| edit.editor != editor);
        let abandoned = before.saturating_sub(self.edits.len());
        if abandoned > 0 {
            debug!(%editor, abandoned, "offline edits abandoned on editor disconnect");
        }
        abandoned
    }

    /// Number of open edits.
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Whether no edit is open.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Whether `identity` has a live session on this node.
    pub fn is_reachable(&self, identity: Identity) -> bool {
        self.sessions.contains(identity)
    }

    fn ensure_offline(&self, target: Identity) -> Result<(), OfflineEditError> {
        if self.sessions.contains(target) {
            return Err(OfflineEditError::TargetOnline(target));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        models::{ItemStack, PlayerSnapshot},
        player_store::{InMemoryPlayerStore, PlayerStore},
    };

    struct Fixture {
        store: InMemoryPlayerStore,
        sessions: Arc<SessionRegistry>,
        manager: OfflineEditManager,
    }

    fn fixture() -> Fixture {
        let store = InMemoryPlayerStore::new();
        let sessions = Arc::new(SessionRegistry::new());
        let manager = OfflineEditManager::new(
            StoreSlot::with_store(Arc::new(store.clone())),
            sessions.clone(),
        );
        Fixture {
            store,
            sessions,
            manager,
        }
    }

    async fn seed(store: &InMemoryPlayerStore, name: &str) -> Identity {
        let id = Uuid::new_v4();
        let mut snapshot = PlayerSnapshot::default();
        snapshot.inventory[0] = Some(ItemStack::new("minecraft:apple", 3));
        snapshot.ender_storage[0] = Some(ItemStack::new("minecraft:diamond", 2));
        store.save_record(id, name.into(), snapshot).await.unwrap();
        id
    }

    #[tokio::test]
    async fn round_trip_persists_mapped_slots_and_drops_padding() {
        let fx = fixture();
        let target = seed(&fx.store, "Steve").await;
        let editor = Uuid::new_v4();

        let edit = fx
            .manager
            .checkout(editor, OfflineLookup::Identity(target), ViewKind::Main)
            .await
            .unwrap();
        fx.manager
            .set_slot(edit.id, 0, Some(ItemStack::new("minecraft:golden_apple", 1)))
            .unwrap();
        fx.manager
            .set_slot(edit.id, 36, Some(ItemStack::new("minecraft:turtle_helmet", 1)))
            .unwrap();
        fx.manager
            .set_slot(edit.id, 40, Some(ItemStack::new("minecraft:shield", 1)))
            .unwrap();
        fx.manager
            .set_slot(edit.id, 43, Some(ItemStack::new("minecraft:barrier", 1)))
            .unwrap();

        let (_, outcome) = fx.manager.commit(edit.id).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Saved);

        let reopened = fx
            .manager
            .checkout(editor, OfflineLookup::Identity(target), ViewKind::Main)
            .await
            .unwrap();
        let slots = reopened.view.slots();
        assert_eq!(slots[0], Some(ItemStack::new("minecraft:golden_apple", 1)));
        assert_eq!(slots[36], Some(ItemStack::new("minecraft:turtle_helmet", 1)));
        assert_eq!(slots[40], Some(ItemStack::new("minecraft:shield", 1)));
        assert_eq!(slots[43], None);

        let stored = fx.store.record(target).unwrap();
        assert_eq!(
            stored.snapshot.ender_storage[0],
            Some(ItemStack::new("minecraft:diamond", 2))
        );
    }

    #[tokio::test]
    async fn clean_commit_makes_no_store_call() {
        let fx = fixture();
        let target = seed(&fx.store, "Alex").await;
        let saves = fx.store.save_count();

        let edit = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Name("alex".into()), ViewKind::Ender)
            .await
            .unwrap();
        assert_eq!(edit.target, target);
        fx.manager.set_slot(edit.id, 44, None).unwrap_err();

        let (_, outcome) = fx.manager.commit(edit.id).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Unchanged);
        assert_eq!(fx.store.save_count(), saves);
        assert!(fx.manager.is_empty());
    }

    #[tokio::test]
    async fn ender_commit_leaves_main_inventory_alone() {
        let fx = fixture();
        let target = seed(&fx.store, "Alex").await;

        let edit = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Identity(target), ViewKind::Ender)
            .await
            .unwrap();
        fx.manager.set_slot(edit.id, 0, None).unwrap();
        fx.manager.commit(edit.id).await.unwrap();

        let stored = fx.store.record(target).unwrap();
        assert_eq!(stored.snapshot.ender_storage[0], None);
        assert_eq!(
            stored.snapshot.inventory[0],
            Some(ItemStack::new("minecraft:apple", 3))
        );
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let fx = fixture();
        let err = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Name("nobody".into()), ViewKind::Main)
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineEditError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_identity_is_not_found_and_nothing_is_written() {
        let fx = fixture();
        let stranger = Uuid::new_v4();
        let err = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Identity(stranger), ViewKind::Main)
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineEditError::NotFound(OfflineLookup::Identity(id)) if id == stranger));
        assert!(fx.manager.is_empty());
        assert!(fx.store.record(stranger).is_none());
        assert_eq!(fx.store.save_count(), 0);
    }

    #[tokio::test]
    async fn live_target_cannot_be_checked_out_or_committed() {
        let fx = fixture();
        let target = seed(&fx.store, "Steve").await;

        fx.sessions.open(target, "Steve".into());
        let err = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Name("Steve".into()), ViewKind::Main)
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineEditError::TargetOnline(id) if id == target));

        fx.sessions.close(target);
        let edit = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Identity(target), ViewKind::Main)
            .await
            .unwrap();
        fx.manager.set_slot(edit.id, 1, None).unwrap();
        fx.sessions.open(target, "Steve".into());
        let err = fx.manager.commit(edit.id).await.unwrap_err();
        assert!(matches!(err, OfflineEditError::TargetOnline(_)));
    }

    #[tokio::test]
    async fn persist_failure_is_reported_with_the_target() {
        let fx = fixture();
        let target = seed(&fx.store, "Steve").await;
        let edit = fx
            .manager
            .checkout(Uuid::new_v4(), OfflineLookup::Identity(target), ViewKind::Main)
            .await
            .unwrap();
        fx.manager.set_slot(edit.id, 2, None).unwrap();

        fx.store.set_unavailable(true);
        let err = fx.manager.commit(edit.id).await.unwrap_err();
        assert!(matches!(err, OfflineEditError::Persist { target: id, .. } if id == target));
    }

    #[tokio::test]
    async fn editor_disconnect_abandons_only_their_edits() {
        let fx = fixture();
        let target = seed(&fx.store, "Steve").await;
        let editor = Uuid::new_v4();
        let other = Uuid::new_v4();

        for who in [editor, editor, other] {
            fx.manager
                .checkout(who, OfflineLookup::Identity(target), ViewKind::Main)
                .await
                .unwrap();
        }
        assert_eq!(fx.manager.abandon_by_editor(editor), 2);
        assert_eq!(fx.manager.len(), 1);
    }
}
