use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    dao::models::{Identity, PlayerSnapshot},
    dto::sse::{
        EffectsClearedEvent, NoticeKind, RecordLoadedEvent, ServerEvent, SessionNoticeEvent,
        SystemStatus, TransferRequestedEvent,
    },
    state::{SseHub, state_machine::Notice},
};

const EVENT_RECORD_LOADED: &str = "session.loaded";
const EVENT_SESSION_NOTICE: &str = "session.notice";
const EVENT_EFFECTS_CLEARED: &str = "session.effects_cleared";
const EVENT_TRANSFER_REQUESTED: &str = "session.transfer";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Hand the stored record of `identity` to the game server.
pub fn broadcast_record_loaded(hub: &SseHub, identity: Identity, snapshot: &PlayerSnapshot) {
    let payload = RecordLoadedEvent {
        identity,
        snapshot: snapshot.clone(),
    };
    send_event(hub, EVENT_RECORD_LOADED, &payload);
}

/// Broadcast a notice addressed to `identity`.
pub fn broadcast_notice(hub: &SseHub, identity: Identity, notice: &Notice) {
    let (kind, target) = match notice {
        Notice::Loaded => (NoticeKind::Loaded, None),
        Notice::LoadFailed => (NoticeKind::LoadFailed, None),
        Notice::OfflineCommitFailed { target } => (NoticeKind::OfflineCommitFailed, Some(*target)),
    };
    let payload = SessionNoticeEvent {
        identity,
        notice: kind,
        target,
    };
    send_event(hub, EVENT_SESSION_NOTICE, &payload);
}

/// Ask the game server to clear transient effects of `identity`.
pub fn broadcast_effects_cleared(hub: &SseHub, identity: Identity) {
    send_event(hub, EVENT_EFFECTS_CLEARED, &EffectsClearedEvent { identity });
}

/// Ask the proxy to move `identity` to `target`.
pub fn broadcast_transfer(hub: &SseHub, identity: Identity, target: &str) {
    let payload = TransferRequestedEvent {
        identity,
        target: target.to_owned(),
    };
    send_event(hub, EVENT_TRANSFER_REQUESTED, &payload);
}

/// Broadcast the storage degraded flag.
pub fn broadcast_system_status(hub: &SseHub, degraded: bool) {
    send_event(hub, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(payload) => {
            if hub.broadcast(payload) == 0 {
                debug!(event, "no event stream connected; event dropped");
            }
        }
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn offline_commit_notice_carries_the_target() {
        let hub = SseHub::new(4);
        let mut rx = hub.subscribe();
        let editor = Uuid::new_v4();
        let target = Uuid::new_v4();

        broadcast_notice(&hub, editor, &Notice::OfflineCommitFailed { target });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SESSION_NOTICE));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["notice"], "offline_commit_failed");
        assert_eq!(body["target"], target.to_string());
    }

    #[test]
    fn loaded_notice_omits_target() {
        let hub = SseHub::new(4);
        let mut rx = hub.subscribe();
        broadcast_notice(&hub, Uuid::new_v4(), &Notice::Loaded);
        let body: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap().data).unwrap();
        assert_eq!(body["notice"], "loaded");
        assert!(body.get("target").is_none());
    }
}
