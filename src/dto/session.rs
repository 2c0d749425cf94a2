//! DTOs of the live session endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::PlayerSnapshot,
    dto::validation::{validate_player_name, validate_snapshot},
    services::dispatcher::{DispatchOutcome, LifecycleEvent, TeleportCause},
    state::{session::LiveSession, state_machine::SessionPhase},
};

/// Session lifecycle phase as exposed over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhaseDto {
    /// No session.
    Offline,
    /// Record load in flight.
    Loading,
    /// Playing.
    Active,
    /// Final save in flight.
    Saving,
}

impl From<SessionPhase> for SessionPhaseDto {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Offline => SessionPhaseDto::Offline,
            SessionPhase::Loading => SessionPhaseDto::Loading,
            SessionPhase::Active => SessionPhaseDto::Active,
            SessionPhase::Saving => SessionPhaseDto::Saving,
        }
    }
}

/// Teleport cause reported by the game server.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeleportCauseDto {
    /// Moved by a plugin; with a destination it counts as a node switch.
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

impl From<TeleportCauseDto> for TeleportCause {
    fn from(cause: TeleportCauseDto) -> Self {
        match cause {
            TeleportCauseDto::Plugin => TeleportCause::Plugin,
            TeleportCauseDto::Command => TeleportCause::Command,
            TeleportCauseDto::EnderPearl => TeleportCause::EnderPearl,
            TeleportCauseDto::Portal => TeleportCause::Portal,
            TeleportCauseDto::Unknown => TeleportCause::Unknown,
        }
    }
}

/// Lifecycle event posted by the game server.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEventRequest {
    /// Player joined the node.
    Connect {
        /// Display name.
        name: String,
    },
    /// Player quit. Answered after the final save.
    Disconnect,
    /// Player was kicked.
    Kick,
    /// Player changed world.
    WorldChange,
    /// Player died.
    Death,
    /// Player teleported.
    Teleport {
        /// Teleport cause.
        cause: TeleportCauseDto,
        /// Target node, when the plugin resolved one.
        #[serde(default)]
        destination: Option<String>,
    },
    /// Player respawned.
    Respawn,
    /// Experience points changed.
    ExperienceChange,
    /// Level changed.
    LevelChange,
    /// Item enchanted.
    Enchant,
}

impl Validate for LifecycleEventRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let LifecycleEventRequest::Connect { name } = self {
            if let Err(e) = validate_player_name(name) {
                errors.add("name", e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<LifecycleEventRequest> for LifecycleEvent {
    fn from(request: LifecycleEventRequest) -> Self {
        match request {
            LifecycleEventRequest::Connect { name } => LifecycleEvent::Connect { name },
            LifecycleEventRequest::Disconnect => LifecycleEvent::Disconnect,
            LifecycleEventRequest::Kick => LifecycleEvent::Kick,
            LifecycleEventRequest::WorldChange => LifecycleEvent::WorldChange,
            LifecycleEventRequest::Death => LifecycleEvent::Death,
            LifecycleEventRequest::Teleport { cause, destination } => LifecycleEvent::Teleport {
                cause: cause.into(),
                destination,
            },
            LifecycleEventRequest::Respawn => LifecycleEvent::Respawn,
            LifecycleEventRequest::ExperienceChange => LifecycleEvent::ExperienceChange,
            LifecycleEventRequest::LevelChange => LifecycleEvent::LevelChange,
            LifecycleEventRequest::Enchant => LifecycleEvent::Enchant,
        }
    }
}

/// How the dispatcher handled a posted event.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchResponse {
    /// Event accepted.
    Applied {
        /// Phase before the event.
        from: SessionPhaseDto,
        /// Phase after the event.
        to: SessionPhaseDto,
        /// Result of the synchronous save, present for disconnects that saved.
        #[serde(skip_serializing_if = "Option::is_none")]
        durable_save: Option<bool>,
    },
    /// Event not valid in the current phase.
    Rejected {
        /// Current phase.
        phase: SessionPhaseDto,
    },
    /// Event never causes store work.
    Ignored,
}

impl From<DispatchOutcome> for DispatchResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Applied {
                from,
                to,
                durable_save,
            } => DispatchResponse::Applied {
                from: from.into(),
                to: to.into(),
                durable_save,
            },
            DispatchOutcome::Rejected { phase } => DispatchResponse::Rejected {
                phase: phase.into(),
            },
            DispatchOutcome::Ignored => DispatchResponse::Ignored,
        }
    }
}

/// Fresh live state pushed by the game server.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LiveStateRequest {
    /// Current in-game state.
    pub snapshot: PlayerSnapshot,
}

impl Validate for LiveStateRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_snapshot(&self.snapshot) {
            errors.add("snapshot", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Whether a live state update reached an active session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LiveStateResponse {
    /// False when no active session took the update.
    pub applied: bool,
}

/// Live session as seen by this node.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    /// Player identity.
    pub identity: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle phase.
    pub phase: SessionPhaseDto,
    /// Whether the applied record came from the store.
    pub loaded_from_store: bool,
    /// A death is waiting for the next respawn to clear effects.
    pub clear_effects_on_respawn: bool,
    /// Milliseconds since the session connected.
    pub connected_for_ms: u64,
    /// Live mirror.
    pub snapshot: PlayerSnapshot,
}

impl From<LiveSession> for SessionView {
    fn from(session: LiveSession) -> Self {
        Self {
            identity: session.identity,
            name: session.name,
            phase: session.phase.into(),
            loaded_from_store: session.loaded_from_store,
            clear_effects_on_respawn: session.clear_effects_on_respawn,
            connected_for_ms: session.connected_at.elapsed().as_millis() as u64,
            snapshot: session.mirror,
        }
    }
}
