use std::time::Duration;

use thiserror::Error;

use crate::{config::SyncSettings, dao::models::Identity};

/// Lifecycle phases of a session on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No live connection.
    Offline,
    /// Connected; the record is being read from the store.
    Loading,
    /// Connected with the record applied (or defaults after a failed load).
    Active,
    /// Disconnecting; the final synchronous save is in progress.
    Saving,
}

/// Whether a trigger's store work blocks the primary context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Blocks until the store answered.
    Sync,
    /// Runs on the worker context.
    Async,
}

/// Classified lifecycle trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Session joined this node.
    Connect {
        /// Display name.
        name: String,
    },
    /// Graceful quit.
    Disconnect,
    /// Kick.
    ForcedDisconnect,
    /// Moved to another world on the same node.
    WorldChange,
    /// Died.
    Death,
    /// Plugin-initiated teleport that is likely a move to another node.
    CrossNodeTeleport,
    /// Respawned; may be routed to the lobby node.
    RespawnTransfer,
    /// Experience, level or enchant-driven progress changed.
    ProgressChange,
}

impl Trigger {
    /// Execution mode of the store work this trigger causes.
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Trigger::Disconnect | Trigger::ForcedDisconnect => ExecutionMode::Sync,
            _ => ExecutionMode::Async,
        }
    }

    /// Whether the configuration enables saving for this trigger.
    pub fn is_enabled(&self, settings: &SyncSettings) -> bool {
        let autosave = &settings.autosave;
        match self {
            Trigger::Connect { .. } | Trigger::Disconnect => true,
            Trigger::ForcedDisconnect => autosave.on_kick,
            Trigger::WorldChange => autosave.on_world_change,
            Trigger::Death => autosave.on_death,
            Trigger::CrossNodeTeleport => autosave.on_server_switch,
            Trigger::RespawnTransfer => settings.respawn_to_lobby.enabled,
            Trigger::ProgressChange => autosave.on_xp_change,
        }
    }
}

/// Input of the session state machine: triggers plus the load outcome fed back by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Lifecycle trigger.
    Trigger(Trigger),
    /// The record was read and applied.
    LoadSucceeded,
    /// The record could not be read.
    LoadFailed,
}

/// Why a save was issued; carried into logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    /// Graceful quit.
    Disconnect,
    /// Forced disconnect with the kick gate on.
    Kick,
    /// World change.
    WorldChange,
    /// Death.
    Death,
    /// Likely move to another node.
    Teleport,
    /// Respawn routed to the lobby.
    Respawn,
    /// Experience, level or enchant change.
    Progress,
    /// The node is stopping with the session still connected.
    Shutdown,
}

impl SaveReason {
    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SaveReason::Disconnect => "disconnect",
            SaveReason::Kick => "kick",
            SaveReason::WorldChange => "world_change",
            SaveReason::Death => "death",
            SaveReason::Teleport => "teleport",
            SaveReason::Respawn => "respawn",
            SaveReason::Progress => "progress",
            SaveReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for SaveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages shown to a session or an editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The persisted record was applied.
    Loaded,
    /// The record could not be read; the session continues with empty state.
    LoadFailed,
    /// An offline edit of `target` could not be persisted.
    OfflineCommitFailed {
        /// Player whose record was edited.
        target: Identity,
    },
}

/// Side effect requested by a transition, interpreted on the primary context in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Register the live session with an empty mirror.
    OpenSession {
        /// Display name.
        name: String,
    },
    /// Start the store read after `delay`.
    ScheduleLoad {
        /// Pause before the read.
        delay: Duration,
    },
    /// Capture the mirror and save it on the worker pool.
    SaveAsync(SaveReason),
    /// Capture and save on the worker pool, then transfer to `target` whatever the outcome.
    SaveAsyncThenTransfer {
        /// Destination node.
        target: String,
    },
    /// Capture and save, blocking the primary context until the write returns.
    SaveSync(SaveReason),
    /// Ask the debounce guard, then save asynchronously when accepted.
    DebouncedSave,
    /// Drop the identity from the debounce table.
    ForgetDebounce,
    /// Abandon offline edits opened by this identity.
    AbandonOfflineEdits,
    /// Remember to clear transient effects after the next respawn.
    MarkEffectsForClearing,
    /// Clear transient effects after `delay`.
    ScheduleEffectClear {
        /// Pause before clearing.
        delay: Duration,
    },
    /// Send a notice to the player.
    Notify(Notice),
    /// Remove the live session; the identity becomes offline.
    CloseSession,
}

/// Facts a transition depends on besides the phase and the event.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    /// Node settings.
    pub settings: &'a SyncSettings,
    /// Cross-node transport is usable right now.
    pub transport_available: bool,
    /// A death is waiting for its post-respawn effect clearing.
    pub clear_effects_pending: bool,
}

/// Result of a valid transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Phase before the event.
    pub from: SessionPhase,
    /// Phase after the event.
    pub to: SessionPhase,
    /// Side effects, in execution order.
    pub effects: Vec<Effect>,
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the event arrived in.
    pub from: SessionPhase,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Compute the next phase and the effects for `event`.
pub fn transition(
    phase: SessionPhase,
    event: SessionEvent,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, InvalidTransition> {
    use SessionPhase::*;

    let settings = ctx.settings;
    let tick = settings.timings.tick;
    let gated = |trigger: &Trigger| trigger.is_enabled(settings);

    let (to, effects) = match (phase, &event) {
        (Offline, SessionEvent::Trigger(Trigger::Connect { name })) => (
            Loading,
            vec![
                Effect::OpenSession { name: name.clone() },
                Effect::ScheduleLoad { delay: tick },
            ],
        ),
        (Loading, SessionEvent::LoadSucceeded) => {
            let mut effects = Vec::new();
            if settings.notices.on_load {
                effects.push(Effect::Notify(Notice::Loaded));
            }
            (Active, effects)
        }
        (Loading, SessionEvent::LoadFailed) => {
            let mut effects = Vec::new();
            if settings.notices.on_load_failure {
                effects.push(Effect::Notify(Notice::LoadFailed));
            }
            (Active, effects)
        }
        // Nothing was applied yet, so there is nothing newer than the stored record.
        (
            Loading,
            SessionEvent::Trigger(Trigger::Disconnect | Trigger::ForcedDisconnect),
        ) => (
            Offline,
            vec![
                Effect::ForgetDebounce,
                Effect::AbandonOfflineEdits,
                Effect::CloseSession,
            ],
        ),
        (Active, SessionEvent::Trigger(trigger @ Trigger::Disconnect))
        | (Active, SessionEvent::Trigger(trigger @ Trigger::ForcedDisconnect)) => {
            // A kick is followed by a quit, so the final save happens even with the kick gate off.
            let reason = match trigger {
                Trigger::ForcedDisconnect if gated(trigger) => SaveReason::Kick,
                _ => SaveReason::Disconnect,
            };
            (
                Saving,
                vec![
                    Effect::ForgetDebounce,
                    Effect::AbandonOfflineEdits,
                    Effect::SaveSync(reason),
                    Effect::CloseSession,
                ],
            )
        }
        (Active, SessionEvent::Trigger(trigger @ Trigger::WorldChange)) => {
            let effects = if gated(trigger) {
                vec![Effect::SaveAsync(SaveReason::WorldChange)]
            } else {
                Vec::new()
            };
            (Active, effects)
        }
        (Active, SessionEvent::Trigger(trigger @ Trigger::Death)) => {
            let mut effects = Vec::new();
            if gated(trigger) {
                effects.push(Effect::SaveAsync(SaveReason::Death));
            }
            effects.push(Effect::MarkEffectsForClearing);
            (Active, effects)
        }
        (Active, SessionEvent::Trigger(trigger @ Trigger::CrossNodeTeleport)) => {
            let effects = if gated(trigger) {
                vec![Effect::SaveAsync(SaveReason::Teleport)]
            } else {
                Vec::new()
            };
            (Active, effects)
        }
        (Active, SessionEvent::Trigger(Trigger::RespawnTransfer)) => {
            let mut effects = Vec::new();
            if ctx.clear_effects_pending {
                effects.push(Effect::ScheduleEffectClear { delay: tick });
            }
            if ctx.transport_available {
                if let Some(target) = settings.lobby_target() {
                    effects.push(Effect::SaveAsyncThenTransfer {
                        target: target.to_owned(),
                    });
                }
            }
            (Active, effects)
        }
        (Active, SessionEvent::Trigger(trigger @ Trigger::ProgressChange)) => {
            let effects = if gated(trigger) {
                vec![Effect::DebouncedSave]
            } else {
                Vec::new()
            };
            (Active, effects)
        }
        (from, _) => {
            return Err(InvalidTransition {
                from,
                event: event.clone(),
            });
        }
    };

    Ok(Transition {
        from: phase,
        to,
        effects,
    })
}
