//! Per-identity lifecycle handling on the primary context.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::SyncSettings,
    dao::models::{Identity, PlayerSnapshot},
    services::{
        debounce::DebounceGuard,
        execution::ExecutionBridge,
        host::{NOTICE_PERMISSION, SessionHost},
        offline_edit::OfflineEditManager,
        orchestrator::{LoadOutcome, SaveLoadOrchestrator, SaveRequest},
    },
    state::{
        session::SessionRegistry,
        state_machine::{
            Effect, Notice, SaveReason, SessionEvent, SessionPhase, TransitionContext, Trigger,
            transition,
        },
    },
};

/// What caused a teleport, as reported by the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportCause {
    /// Plugin teleport.
    Plugin,
    /// Command teleport.
    Command,
    /// Ender pearl.
    EnderPearl,
    /// Portal.
    Portal,
    /// Anything else.
    Unknown,
}

/// Raw lifecycle events reported by the game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Player joined under `name`.
    Connect {
        /// Display name.
        name: String,
    },
    /// Player quit.
    Disconnect,
    /// Player was kicked.
    Kick,
    /// World change.
    WorldChange,
    /// Death.
    Death,
    /// Teleport with its cause and resolved destination.
    Teleport {
        /// Teleport cause.
        cause: TeleportCause,
        /// Target node, when resolved.
        destination: Option<String>,
    },
    /// Respawn.
    Respawn,
    /// Experience change.
    ExperienceChange,
    /// Level change.
    LevelChange,
    /// Enchant.
    Enchant,
}

impl LifecycleEvent {
    /// Map the raw event to a trigger. `None` for events that never cause store work.
    pub fn classify(self) -> Option<Trigger> {
        Some(match self {
            LifecycleEvent::Connect { name } => Trigger::Connect { name },
            LifecycleEvent::Disconnect => Trigger::Disconnect,
            LifecycleEvent::Kick => Trigger::ForcedDisconnect,
            LifecycleEvent::WorldChange => Trigger::WorldChange,
            LifecycleEvent::Death => Trigger::Death,
            // A plugin moving a player to a resolved destination usually precedes a node switch.
            LifecycleEvent::Teleport {
                cause: TeleportCause::Plugin,
                destination: Some(_),
            } => Trigger::CrossNodeTeleport,
            LifecycleEvent::Teleport { .. } => return None,
            LifecycleEvent::Respawn => Trigger::RespawnTransfer,
            LifecycleEvent::ExperienceChange
            | LifecycleEvent::LevelChange
            | LifecycleEvent::Enchant => Trigger::ProgressChange,
        })
    }
}

/// Result of handing an event to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The state machine accepted the event.
    Applied {
        /// Phase before the event.
        from: SessionPhase,
        /// Phase after the event.
        to: SessionPhase,
        /// Outcome of the synchronous save, when the event caused one.
        durable_save: Option<bool>,
    },
    /// The event is not valid in the current phase.
    Rejected {
        /// Current phase.
        phase: SessionPhase,
    },
    /// The event does not map to any trigger.
    Ignored,
}

/// Owner of every live session mutation. Lives on the primary context.
pub struct SessionDispatcher {
    bridge: ExecutionBridge<SessionDispatcher>,
    orchestrator: SaveLoadOrchestrator,
    sessions: Arc<SessionRegistry>,
    debounce: DebounceGuard,
    host: Arc<dyn SessionHost>,
    offline_edits: Arc<OfflineEditManager>,
    settings: Arc<SyncSettings>,
}

impl SessionDispatcher {
    /// Wire the dispatcher to its bridge, store access and host.
    pub fn new(
        bridge: ExecutionBridge<SessionDispatcher>,
        orchestrator: SaveLoadOrchestrator,
        sessions: Arc<SessionRegistry>,
        debounce: DebounceGuard,
        host: Arc<dyn SessionHost>,
        offline_edits: Arc<OfflineEditManager>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            bridge,
            orchestrator,
            sessions,
            debounce,
            host,
            offline_edits,
            settings,
        }
    }

    /// Classify and apply a raw lifecycle event.
    pub fn handle(&mut self, identity: Identity, event: LifecycleEvent) -> DispatchOutcome {
        let Some(trigger) = event.clone().classify() else {
            debug!(%identity, ?event, "event does not map to a trigger");
            return DispatchOutcome::Ignored;
        };
        self.apply(identity, SessionEvent::Trigger(trigger))
    }

    /// Replace the mirror of an active session with fresh live state.
    pub fn update_live_state(&mut self, identity: Identity, snapshot: PlayerSnapshot) -> bool {
        let applied = self.sessions.update_mirror(identity, snapshot);
        if !applied {
            debug!(%identity, "live state update ignored; session is not active");
        }
        applied
    }

    /// Tell `editor` that the offline edit of `target` was lost, if they are still here.
    pub fn report_offline_commit_failure(&mut self, editor: Identity, target: Identity) {
        if self.sessions.contains(editor) {
            self.host
                .notify(editor, &Notice::OfflineCommitFailed { target });
        } else {
            warn!(%editor, %target, "offline edit failed and the editor is no longer reachable");
        }
    }

    /// Synchronously save and close every active session. Returns how many saves succeeded.
    pub fn flush_live_sessions(&mut self) -> usize {
        let mut saved = 0;
        for identity in self.sessions.identities_in(SessionPhase::Active) {
            self.sessions.set_phase(identity, SessionPhase::Saving);
            if let Some(request) = self.capture(identity, SaveReason::Shutdown) {
                if self.orchestrator.save_sync(&self.bridge, request) {
                    saved += 1;
                }
            }
            self.debounce.forget(identity);
            self.sessions.close(identity);
        }
        saved
    }

    fn apply(&mut self, identity: Identity, event: SessionEvent) -> DispatchOutcome {
        let phase = self.sessions.phase(identity);
        let ctx = TransitionContext {
            settings: &self.settings,
            transport_available: self.settings.proxy.transport_enabled
                && self.host.supports_node_transfer(),
            clear_effects_pending: self.sessions.clear_effects_pending(identity),
        };

        let next = match transition(phase, event, &ctx) {
            Ok(next) => next,
            Err(err) => {
                debug!(%identity, error = %err, "event ignored");
                return DispatchOutcome::Rejected { phase };
            }
        };

        if next.from != next.to {
            debug!(%identity, from = ?next.from, to = ?next.to, "session phase changed");
        }
        self.sessions.set_phase(identity, next.to);

        let mut durable_save = None;
        for effect in next.effects {
            if let Some(saved) = self.run_effect(identity, effect) {
                durable_save = Some(saved);
            }
        }

        DispatchOutcome::Applied {
            from: next.from,
            to: next.to,
            durable_save,
        }
    }

    /// Interpret one effect. Returns the outcome of a synchronous save.
    fn run_effect(&mut self, identity: Identity, effect: Effect) -> Option<bool> {
        match effect {
            Effect::OpenSession { name } => {
                info!(%identity, name = %name, "session connected");
                self.sessions.open(identity, name);
            }
            Effect::ScheduleLoad { delay } => self.schedule_load(identity, delay),
            Effect::SaveAsync(reason) => {
                if let Some(request) = self.capture(identity, reason) {
                    self.orchestrator.save_async(&self.bridge, request);
                }
            }
            Effect::SaveAsyncThenTransfer { target } => {
                if let Some(request) = self.capture(identity, SaveReason::Respawn) {
                    self.orchestrator
                        .save_async_then(&self.bridge, request, move |dispatcher, saved| {
                            dispatcher.transfer(identity, &target, saved);
                        });
                }
            }
            Effect::SaveSync(reason) => {
                let request = self.capture(identity, reason)?;
                return Some(self.orchestrator.save_sync(&self.bridge, request));
            }
            Effect::DebouncedSave => {
                if self.debounce.try_accept(identity) {
                    if let Some(request) = self.capture(identity, SaveReason::Progress) {
                        self.orchestrator.save_async(&self.bridge, request);
                    }
                } else {
                    debug!(%identity, "progress save suppressed by debounce window");
                }
            }
            Effect::ForgetDebounce => self.debounce.forget(identity),
            Effect::AbandonOfflineEdits => {
                self.offline_edits.abandon_by_editor(identity);
            }
            Effect::MarkEffectsForClearing => {
                self.sessions.set_clear_effects_pending(identity, true);
            }
            Effect::ScheduleEffectClear { delay } => {
                self.sessions.take_clear_effects_pending(identity);
                if let Some(session_id) = self.sessions.session_id(identity) {
                    self.bridge.run_on_primary_after(delay, move |dispatcher| {
                        dispatcher.clear_effects(identity, session_id);
                    });
                }
            }
            Effect::Notify(notice) => self.notify(identity, &notice),
            Effect::CloseSession => {
                if self.sessions.close(identity).is_some() {
                    info!(%identity, "session closed");
                }
            }
        }
        None
    }

    fn schedule_load(&self, identity: Identity, delay: Duration) {
        let Some(session_id) = self.sessions.session_id(identity) else {
            return;
        };
        self.bridge.run_on_primary_after(delay, move |dispatcher| {
            dispatcher.begin_load(identity, session_id);
        });
    }

    fn begin_load(&mut self, identity: Identity, session_id: Uuid) {
        if !self.sessions.is_current(identity, session_id) {
            debug!(%identity, "session ended before its load started");
            return;
        }
        let load = self.orchestrator.load(identity);
        self.bridge
            .run_on_worker_then_primary(load, move |dispatcher, outcome| {
                dispatcher.finish_load(identity, session_id, outcome);
            });
    }

    fn finish_load(&mut self, identity: Identity, session_id: Uuid, outcome: LoadOutcome) {
        if !self.sessions.is_current(identity, session_id) {
            debug!(%identity, "session ended before its load completed; result dropped");
            return;
        }
        let event = match outcome {
            LoadOutcome::Loaded(record) => {
                // A synthesized record carries nothing the game server should overwrite its state with.
                let delivered = record.exists_in_database.then(|| record.snapshot.clone().normalized());
                if self.sessions.apply_record(identity, session_id, record) {
                    if let Some(snapshot) = delivered {
                        self.host.apply_record(identity, &snapshot);
                    }
                }
                SessionEvent::LoadSucceeded
            }
            LoadOutcome::Failed => SessionEvent::LoadFailed,
        };
        self.apply(identity, event);
    }

    fn transfer(&mut self, identity: Identity, target: &str, saved: bool) {
        if !self.sessions.contains(identity) {
            debug!(%identity, target, "session left before the node transfer");
            return;
        }
        if !saved {
            warn!(%identity, target, "transferring after a failed save");
        }
        if self.host.transfer_to_node(identity, target) {
            info!(%identity, target, "node transfer requested");
        }
    }

    fn clear_effects(&mut self, identity: Identity, session_id: Uuid) {
        if !self.sessions.is_current(identity, session_id) {
            return;
        }
        self.sessions.clear_mirror_effects(identity);
        self.host.clear_transient_effects(identity);
    }

    fn notify(&self, identity: Identity, notice: &Notice) {
        if self.host.has_permission(identity, NOTICE_PERMISSION) {
            self.host.notify(identity, notice);
        }
    }

    fn capture(&self, identity: Identity, reason: SaveReason) -> Option<SaveRequest> {
        let Some((name, snapshot)) = self.sessions.capture(identity) else {
            debug!(%identity, %reason, "no live session to save");
            return None;
        };
        Some(SaveRequest {
            identity,
            name,
            snapshot,
            reason,
        })
    }
}
