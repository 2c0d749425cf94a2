use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::PlayerSnapshot;

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    /// SSE `event:` field; `None` sends an unnamed message.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the node emitting events.
    pub server: String,
    /// Whether the node is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the node enters or leaves degraded mode.
pub struct SystemStatus {
    /// True while no store is connected.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Kind of message shown to a player.
pub enum NoticeKind {
    /// Stored record applied to the session.
    Loaded,
    /// Record could not be read; the session keeps the game state.
    LoadFailed,
    /// An offline edit of this editor failed to persist.
    OfflineCommitFailed,
}

#[derive(Debug, Serialize, ToSchema)]
/// Message addressed to a connected player.
pub struct SessionNoticeEvent {
    /// Recipient.
    pub identity: Uuid,
    /// What happened.
    pub notice: NoticeKind,
    /// Record the notice is about, when it differs from the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Asks the game server to drop transient status effects of a player.
pub struct EffectsClearedEvent {
    /// Player whose effects are cleared.
    pub identity: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Asks the proxy to move a player to another node.
pub struct TransferRequestedEvent {
    /// Player to move.
    pub identity: Uuid,
    /// Destination node name as known by the proxy.
    pub target: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Stored record the game server must apply to a freshly loaded session.
pub struct RecordLoadedEvent {
    /// Player the record belongs to.
    pub identity: Uuid,
    /// Normalized stored state.
    pub snapshot: PlayerSnapshot,
}
