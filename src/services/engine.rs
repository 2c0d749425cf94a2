//! Entry point wiring the dispatcher, the store and the execution contexts together.

use std::{
    io,
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::SyncSettings,
    dao::{
        models::{Identity, OfflineLookup, PlayerSnapshot, Slot},
        player_store::StoreSlot,
    },
    services::{
        debounce::DebounceGuard,
        dispatcher::{DispatchOutcome, LifecycleEvent, SessionDispatcher},
        execution::{ExecutionBridge, PrimaryStopped, PrimaryThread, spawn_primary},
        host::SessionHost,
        offline_edit::{CommitOutcome, OfflineEditError, OfflineEditManager, OfflineEditSession},
        orchestrator::SaveLoadOrchestrator,
    },
    state::{
        inventory_view::ViewKind,
        session::{LiveSession, SessionRegistry},
    },
};

/// Errors surfaced by [`SyncEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The primary context is gone.
    #[error(transparent)]
    PrimaryStopped(#[from] PrimaryStopped),
    /// The primary context thread could not be spawned.
    #[error("failed to start the primary context thread")]
    Spawn(#[source] io::Error),
    /// Offline edit failure.
    #[error(transparent)]
    OfflineEdit(#[from] OfflineEditError),
}

/// Cloneable handle to a running synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    bridge: ExecutionBridge<SessionDispatcher>,
    sessions: Arc<SessionRegistry>,
    offline_edits: Arc<OfflineEditManager>,
    settings: Arc<SyncSettings>,
    primary: Arc<Mutex<Option<PrimaryThread>>>,
}

impl SyncEngine {
    /// Start the primary context; store I/O runs on `runtime`.
    pub fn start(
        runtime: Handle,
        store: Arc<StoreSlot>,
        host: Arc<dyn SessionHost>,
        settings: Arc<SyncSettings>,
    ) -> Result<Self, EngineError> {
        let sessions = Arc::new(SessionRegistry::new());
        let offline_edits = Arc::new(OfflineEditManager::new(store.clone(), sessions.clone()));
        let orchestrator =
            SaveLoadOrchestrator::new(store, settings.timings.slow_save_threshold);

        let (bridge, primary) = {
            let sessions = sessions.clone();
            let offline_edits = offline_edits.clone();
            let settings = settings.clone();
            spawn_primary(runtime, move |bridge| {
                let debounce = DebounceGuard::new(settings.timings.debounce_window);
                SessionDispatcher::new(
                    bridge,
                    orchestrator,
                    sessions,
                    debounce,
                    host,
                    offline_edits,
                    settings,
                )
            })
            .map_err(EngineError::Spawn)?
        };

        info!(server = %settings.server.id, "sync engine started");
        Ok(Self {
            bridge,
            sessions,
            offline_edits,
            settings,
            primary: Arc::new(Mutex::new(Some(primary))),
        })
    }

    /// Apply `event` and wait until the dispatcher handled it.
    ///
    /// For a disconnect this returns only after the synchronous save completed.
    pub async fn dispatch(
        &self,
        identity: Identity,
        event: LifecycleEvent,
    ) -> Result<DispatchOutcome, EngineError> {
        let outcome = self
            .bridge
            .call_primary(move |dispatcher| dispatcher.handle(identity, event))
            .await?;
        Ok(outcome)
    }

    /// Queue `event` without waiting for it.
    pub fn submit(&self, identity: Identity, event: LifecycleEvent) -> Result<(), EngineError> {
        if self
            .bridge
            .run_on_primary(move |dispatcher| {
                dispatcher.handle(identity, event);
            })
        {
            Ok(())
        } else {
            Err(PrimaryStopped.into())
        }
    }

    /// Replace the mirror of an active session. Returns whether the session accepted it.
    pub async fn update_live_state(
        &self,
        identity: Identity,
        snapshot: PlayerSnapshot,
    ) -> Result<bool, EngineError> {
        let applied = self
            .bridge
            .call_primary(move |dispatcher| dispatcher.update_live_state(identity, snapshot))
            .await?;
        Ok(applied)
    }

    /// Copy of the live session of `identity`.
    pub fn session(&self, identity: Identity) -> Option<LiveSession> {
        self.sessions.get(identity)
    }

    /// Number of live sessions on this node.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Settings the engine was started with.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Open offline edits.
    pub fn offline_edits(&self) -> &OfflineEditManager {
        &self.offline_edits
    }

    /// Open an offline edit of the record designated by `lookup`.
    pub async fn checkout_offline(
        &self,
        editor: Identity,
        lookup: OfflineLookup,
        kind: ViewKind,
    ) -> Result<OfflineEditSession, EngineError> {
        Ok(self.offline_edits.checkout(editor, lookup, kind).await?)
    }

    /// Place `item` in slot `index` of an open offline edit.
    pub fn set_offline_slot(&self, edit: Uuid, index: usize, item: Slot) -> Result<(), EngineError> {
        Ok(self.offline_edits.set_slot(edit, index, item)?)
    }

    /// Commit an offline edit; a persist failure is reported to the editor when reachable.
    pub async fn commit_offline(&self, edit: Uuid) -> Result<CommitOutcome, EngineError> {
        match self.offline_edits.commit(edit).await {
            Ok((_, outcome)) => Ok(outcome),
            Err(err) => {
                if let OfflineEditError::Persist { editor, target, .. } = &err {
                    let (editor, target) = (*editor, *target);
                    warn!(%editor, %target, error = ?err, "offline edit commit failed");
                    self.bridge.run_on_primary(move |dispatcher| {
                        dispatcher.report_offline_commit_failure(editor, target);
                    });
                }
                Err(err.into())
            }
        }
    }

    /// Save the sessions still live, then stop the primary context after the queued work and
    /// wait for its thread.
    pub async fn shutdown(&self) {
        match self
            .bridge
            .call_primary(|dispatcher| dispatcher.flush_live_sessions())
            .await
        {
            Ok(saved) => info!(saved, "live sessions saved before shutdown"),
            Err(_) => debug!("primary context already stopped"),
        }
        self.bridge.shutdown();
        let primary = self
            .primary
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(primary) = primary {
            if tokio::task::spawn_blocking(move || primary.join())
                .await
                .is_err()
            {
                warn!("failed to join the primary context thread");
            }
        }
        info!("sync engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::RespawnToLobbySettings,
        dao::{
            models::{ItemStack, PersistedRecord, StatusEffect},
            player_store::{InMemoryPlayerStore, PlayerStore},
        },
        services::{
            dispatcher::TeleportCause,
            host::testing::{HostCall, RecordingHost},
        },
        state::state_machine::{Notice, SessionPhase},
    };

    struct Harness {
        engine: SyncEngine,
        store: InMemoryPlayerStore,
        host: Arc<RecordingHost>,
    }

    fn harness(settings: SyncSettings, transport: bool) -> Harness {
        let store = InMemoryPlayerStore::new();
        let host = Arc::new(RecordingHost::new(transport));
        let engine = SyncEngine::start(
            Handle::current(),
            StoreSlot::with_store(Arc::new(store.clone())),
            host.clone(),
            Arc::new(settings),
        )
        .unwrap();
        Harness {
            engine,
            store,
            host,
        }
    }

    fn connect(name: &str) -> LifecycleEvent {
        LifecycleEvent::Connect { name: name.into() }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    async fn connect_active(h: &Harness, id: Identity, name: &str) {
        h.engine.dispatch(id, connect(name)).await.unwrap();
        wait_until(|| {
            h.engine
                .session(id)
                .is_some_and(|session| session.phase == SessionPhase::Active)
        })
        .await;
    }

    fn snapshot_with(kind: &str, level: i32) -> PlayerSnapshot {
        let mut snapshot = PlayerSnapshot::default();
        snapshot.inventory[0] = Some(ItemStack::new(kind, 1));
        snapshot.experience.level = level;
        snapshot
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_save_is_visible_to_the_next_load() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        h.store.set_latency(Duration::from_millis(20));

        connect_active(&h, id, "Steve").await;
        assert!(
            h.engine
                .update_live_state(id, snapshot_with("minecraft:beacon", 30))
                .await
                .unwrap()
        );

        let outcome = h.engine.dispatch(id, LifecycleEvent::Disconnect).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                from: SessionPhase::Active,
                to: SessionPhase::Saving,
                durable_save: Some(true),
            }
        );
        assert!(h.engine.session(id).is_none());

        let stored = h.store.load_record(id).await.unwrap();
        assert_eq!(stored.snapshot.experience.level, 30);
        assert_eq!(
            stored.snapshot.inventory[0],
            Some(ItemStack::new("minecraft:beacon", 1))
        );

        connect_active(&h, id, "Steve").await;
        let session = h.engine.session(id).unwrap();
        assert!(session.loaded_from_store);
        assert_eq!(session.mirror.experience.level, 30);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_and_load_emit_one_loaded_notice() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();

        connect_active(&h, id, "Alex").await;
        wait_until(|| !h.host.notices_for(id).is_empty()).await;
        assert_eq!(h.host.notices_for(id), vec![Notice::Loaded]);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_before_load_completes_suppresses_the_notice() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        h.store.set_latency(Duration::from_millis(100));

        h.engine.dispatch(id, connect("Alex")).await.unwrap();
        let outcome = h.engine.dispatch(id, LifecycleEvent::Disconnect).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                from: SessionPhase::Loading,
                to: SessionPhase::Offline,
                durable_save: None,
            }
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(h.host.notices_for(id).is_empty());
        assert_eq!(h.store.save_count(), 0);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_load_leaves_the_session_playable_with_defaults() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        h.store.set_unavailable(true);

        connect_active(&h, id, "Alex").await;
        wait_until(|| !h.host.notices_for(id).is_empty()).await;
        assert_eq!(h.host.notices_for(id), vec![Notice::LoadFailed]);
        let session = h.engine.session(id).unwrap();
        assert!(!session.loaded_from_store);
        assert!(session.mirror.is_empty_inventory());
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn notices_require_permission() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        h.host.deny(id);

        connect_active(&h, id, "Alex").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.host.notices_for(id).is_empty());
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn progress_burst_collapses_into_one_save() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;

        h.engine
            .dispatch(id, LifecycleEvent::ExperienceChange)
            .await
            .unwrap();
        h.engine.dispatch(id, LifecycleEvent::LevelChange).await.unwrap();
        h.engine.dispatch(id, LifecycleEvent::Enchant).await.unwrap();
        wait_until(|| h.store.save_count() >= 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.store.save_count(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        h.engine
            .dispatch(id, LifecycleEvent::ExperienceChange)
            .await
            .unwrap();
        wait_until(|| h.store.save_count() == 2).await;
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn respawn_transfers_even_when_the_save_fails() {
        let mut settings = SyncSettings::default();
        settings.server.id = "survival-1".into();
        settings.respawn_to_lobby = RespawnToLobbySettings {
            enabled: true,
            server: "lobby".into(),
        };
        let h = harness(settings, true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;

        h.store.set_unavailable(true);
        h.engine.dispatch(id, LifecycleEvent::Respawn).await.unwrap();
        wait_until(|| {
            h.host
                .calls()
                .contains(&HostCall::Transfer(id, "lobby".into()))
        })
        .await;
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn respawn_without_transport_does_not_transfer() {
        let mut settings = SyncSettings::default();
        settings.respawn_to_lobby = RespawnToLobbySettings {
            enabled: true,
            server: "lobby".into(),
        };
        let h = harness(settings, false);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;

        h.engine.dispatch(id, LifecycleEvent::Respawn).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !h.host
                .calls()
                .iter()
                .any(|call| matches!(call, HostCall::Transfer(..)))
        );
        assert_eq!(h.store.save_count(), 0);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn death_saves_before_effects_are_cleared_after_respawn() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;

        let mut snapshot = snapshot_with("minecraft:golden_apple", 5);
        snapshot.effects.push(StatusEffect {
            kind: "minecraft:regeneration".into(),
            amplifier: 1,
            remaining_ticks: 400,
        });
        h.engine.update_live_state(id, snapshot).await.unwrap();

        h.engine.dispatch(id, LifecycleEvent::Death).await.unwrap();
        wait_until(|| h.store.save_count() == 1).await;
        assert_eq!(h.store.record(id).unwrap().snapshot.effects.len(), 1);

        h.engine.dispatch(id, LifecycleEvent::Respawn).await.unwrap();
        wait_until(|| h.host.calls().contains(&HostCall::ClearEffects(id))).await;
        assert!(h.engine.session(id).unwrap().mirror.effects.is_empty());
        assert!(!h.engine.session(id).unwrap().clear_effects_on_respawn);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn events_while_loading_are_rejected() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        h.store.set_latency(Duration::from_millis(200));

        h.engine.dispatch(id, connect("Steve")).await.unwrap();
        let outcome = h.engine.dispatch(id, LifecycleEvent::WorldChange).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                phase: SessionPhase::Loading
            }
        );
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn editor_disconnect_abandons_their_offline_edits() {
        let h = harness(SyncSettings::default(), true);
        let editor = Uuid::new_v4();
        let target = Uuid::new_v4();
        h.store
            .insert(PersistedRecord::stored(target, "Notch".into(), PlayerSnapshot::default(), None));

        connect_active(&h, editor, "Admin").await;
        h.engine
            .checkout_offline(editor, OfflineLookup::Name("notch".into()), ViewKind::Main)
            .await
            .unwrap();
        assert_eq!(h.engine.offline_edits().len(), 1);

        h.engine.dispatch(editor, LifecycleEvent::Disconnect).await.unwrap();
        assert!(h.engine.offline_edits().is_empty());
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_offline_commit_notifies_a_reachable_editor() {
        let h = harness(SyncSettings::default(), true);
        let editor = Uuid::new_v4();
        let target = Uuid::new_v4();
        h.store
            .insert(PersistedRecord::stored(target, "Notch".into(), PlayerSnapshot::default(), None));
        connect_active(&h, editor, "Admin").await;

        let edit = h
            .engine
            .checkout_offline(editor, OfflineLookup::Identity(target), ViewKind::Ender)
            .await
            .unwrap();
        h.engine
            .set_offline_slot(edit.id, 5, Some(ItemStack::new("minecraft:shulker_box", 1)))
            .unwrap();
        h.store.set_unavailable(true);

        let err = h.engine.commit_offline(edit.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::OfflineEdit(OfflineEditError::Persist { .. })
        ));
        wait_until(|| {
            h.host
                .notices_for(editor)
                .contains(&Notice::OfflineCommitFailed { target })
        })
        .await;
        h.engine.shutdown().await;
    }

    fn loaded_snapshot(host: &RecordingHost, identity: Identity) -> Option<PlayerSnapshot> {
        host.calls().into_iter().find_map(|call| match call {
            HostCall::ApplyRecord(id, snapshot) if id == identity => Some(snapshot),
            _ => None,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stored_record_reaches_the_game_server_without_notices() {
        let mut settings = SyncSettings::default();
        settings.notices.on_load = false;
        let h = harness(settings, true);
        let id = Uuid::new_v4();
        h.store.insert(PersistedRecord::stored(
            id,
            "Steve".into(),
            snapshot_with("minecraft:beacon", 30),
            None,
        ));

        connect_active(&h, id, "Steve").await;
        wait_until(|| loaded_snapshot(&h.host, id).is_some()).await;
        assert!(h.host.notices_for(id).is_empty());

        // The game server applies the record, then reports its live state back.
        let mut live = loaded_snapshot(&h.host, id).unwrap();
        assert_eq!(live.inventory[0], Some(ItemStack::new("minecraft:beacon", 1)));
        live.experience.level = 31;
        assert!(h.engine.update_live_state(id, live).await.unwrap());
        h.engine.dispatch(id, LifecycleEvent::Disconnect).await.unwrap();

        let stored = h.store.record(id).unwrap();
        assert_eq!(
            stored.snapshot.inventory[0],
            Some(ItemStack::new("minecraft:beacon", 1))
        );
        assert_eq!(stored.snapshot.experience.level, 31);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_player_keeps_the_game_state() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();

        connect_active(&h, id, "Alex").await;
        wait_until(|| !h.host.notices_for(id).is_empty()).await;
        assert!(loaded_snapshot(&h.host, id).is_none());
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn kick_with_its_gate_off_still_saves_before_closing() {
        let mut settings = SyncSettings::default();
        settings.autosave.on_kick = false;
        let h = harness(settings, true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;
        h.engine
            .update_live_state(id, snapshot_with("minecraft:elytra", 30))
            .await
            .unwrap();

        let outcome = h.engine.dispatch(id, LifecycleEvent::Kick).await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                from: SessionPhase::Active,
                to: SessionPhase::Saving,
                durable_save: Some(true),
            }
        );
        assert!(h.engine.session(id).is_none());
        assert_eq!(h.store.record(id).unwrap().snapshot.experience.level, 30);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn world_change_and_node_switch_write_the_record() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;

        h.engine
            .update_live_state(id, snapshot_with("minecraft:compass", 4))
            .await
            .unwrap();
        h.engine.dispatch(id, LifecycleEvent::WorldChange).await.unwrap();
        wait_until(|| h.store.save_count() == 1).await;
        assert_eq!(h.store.record(id).unwrap().snapshot.experience.level, 4);

        h.engine
            .update_live_state(id, snapshot_with("minecraft:compass", 5))
            .await
            .unwrap();
        let pearl = LifecycleEvent::Teleport {
            cause: TeleportCause::EnderPearl,
            destination: Some("world".into()),
        };
        assert_eq!(
            h.engine.dispatch(id, pearl).await.unwrap(),
            DispatchOutcome::Ignored
        );
        let switch = LifecycleEvent::Teleport {
            cause: TeleportCause::Plugin,
            destination: Some("survival-2".into()),
        };
        h.engine.dispatch(id, switch).await.unwrap();
        wait_until(|| h.store.save_count() == 2).await;
        assert_eq!(h.store.record(id).unwrap().snapshot.experience.level, 5);
        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_saves_sessions_still_connected() {
        let h = harness(SyncSettings::default(), true);
        let id = Uuid::new_v4();
        connect_active(&h, id, "Steve").await;
        h.engine
            .update_live_state(id, snapshot_with("minecraft:trident", 17))
            .await
            .unwrap();

        h.engine.shutdown().await;
        assert_eq!(h.store.record(id).unwrap().snapshot.experience.level, 17);
        assert_eq!(h.engine.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stopped_engine_rejects_events() {
        let h = harness(SyncSettings::default(), true);
        h.engine.shutdown().await;
        let err = h
            .engine
            .dispatch(Uuid::new_v4(), connect("Steve"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PrimaryStopped(_)));
    }
}
