//! Seam toward the game server hosting the sessions.

use tracing::debug;

use crate::{
    dao::models::{Identity, PlayerSnapshot},
    services::sse_events,
    state::{SseHub, state_machine::Notice},
};

/// Permission a session needs to receive load notices.
pub const NOTICE_PERMISSION: &str = "playersync.notify";

/// Operations the engine needs from the game server. Called from the primary context.
pub trait SessionHost: Send + Sync {
    /// Replace the live state of `identity` with the record read from the store.
    fn apply_record(&self, identity: Identity, snapshot: &PlayerSnapshot);
    /// Show `notice` to `identity`.
    fn notify(&self, identity: Identity, notice: &Notice);
    fn has_permission(&self, identity: Identity, permission: &str) -> bool;
    /// Remove transient status effects the game restored on respawn.
    fn clear_transient_effects(&self, identity: Identity);
    /// Ask the proxy to move `identity` to `target`. Returns whether the request was issued.
    fn transfer_to_node(&self, identity: Identity, target: &str) -> bool;
    /// Whether a cross-node transport channel exists.
    fn supports_node_transfer(&self) -> bool;
}

/// Host that publishes every request on the SSE hub for the game server plugin to act on.
pub struct SseSessionHost {
    hub: SseHub,
    transport_enabled: bool,
}

impl SseSessionHost {
    /// Host publishing on `hub`. `transport_enabled` mirrors the proxy setting.
    pub fn new(hub: SseHub, transport_enabled: bool) -> Self {
        Self {
            hub,
            transport_enabled,
        }
    }
}

impl SessionHost for SseSessionHost {
    fn apply_record(&self, identity: Identity, snapshot: &PlayerSnapshot) {
        sse_events::broadcast_record_loaded(&self.hub, identity, snapshot);
    }

    fn notify(&self, identity: Identity, notice: &Notice) {
        sse_events::broadcast_notice(&self.hub, identity, notice);
    }

    // Permissions are enforced by the game server plugin before the notice is shown.
    fn has_permission(&self, _identity: Identity, _permission: &str) -> bool {
        true
    }

    fn clear_transient_effects(&self, identity: Identity) {
        sse_events::broadcast_effects_cleared(&self.hub, identity);
    }

    fn transfer_to_node(&self, identity: Identity, target: &str) -> bool {
        if !self.transport_enabled {
            debug!(%identity, target, "node transfer requested without transport");
            return false;
        }
        sse_events::broadcast_transfer(&self.hub, identity, target);
        true
    }

    fn supports_node_transfer(&self) -> bool {
        self.transport_enabled
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::HashSet, sync::Mutex};

    use super::*;

    /// Interaction recorded by [`RecordingHost`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum HostCall {
        ApplyRecord(Identity, PlayerSnapshot),
        Notify(Identity, Notice),
        ClearEffects(Identity),
        Transfer(Identity, String),
    }

    /// Host double that records every call.
    pub struct RecordingHost {
        calls: Mutex<Vec<HostCall>>,
        denied: Mutex<HashSet<Identity>>,
        transport: bool,
    }

    impl RecordingHost {
        pub fn new(transport: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                denied: Mutex::new(HashSet::new()),
                transport,
            }
        }

        pub fn deny(&self, identity: Identity) {
            self.denied.lock().unwrap().insert(identity);
        }

        pub fn calls(&self) -> Vec<HostCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn notices_for(&self, identity: Identity) -> Vec<Notice> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    HostCall::Notify(id, notice) if id == identity => Some(notice),
                    _ => None,
                })
                .collect()
        }
    }

    impl SessionHost for RecordingHost {
        fn apply_record(&self, identity: Identity, snapshot: &PlayerSnapshot) {
            self.calls
                .lock()
                .unwrap()
                .push(HostCall::ApplyRecord(identity, snapshot.clone()));
        }

        fn notify(&self, identity: Identity, notice: &Notice) {
            self.calls
                .lock()
                .unwrap()
                .push(HostCall::Notify(identity, notice.clone()));
        }

        fn has_permission(&self, identity: Identity, _permission: &str) -> bool {
            !self.denied.lock().unwrap().contains(&identity)
        }

        fn clear_transient_effects(&self, identity: Identity) {
            self.calls.lock().unwrap().push(HostCall::ClearEffects(identity));
        }

        fn transfer_to_node(&self, identity: Identity, target: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(HostCall::Transfer(identity, target.to_owned()));
            true
        }

        fn supports_node_transfer(&self) -> bool {
            self.transport
        }
    }
}
