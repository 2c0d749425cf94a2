//! Live sessions connected to this node and their in-memory mirror of player state.

use std::time::Instant;

use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    dao::models::{Identity, PersistedRecord, PlayerSnapshot},
    state::state_machine::SessionPhase,
};

/// One connected player.
#[derive(Debug, Clone)]
pub struct LiveSession {
    /// Changes on every connect so late load completions of an earlier session are dropped.
    pub session_id: Uuid,
    /// Player identity.
    pub identity: Identity,
    /// Display name given at connect.
    pub name: String,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Current in-memory state; what a save captures.
    pub mirror: PlayerSnapshot,
    /// Set on death, consumed by the next respawn.
    pub clear_effects_on_respawn: bool,
    /// Whether the applied record came from the store (false after a failed load).
    pub loaded_from_store: bool,
    /// Connect time.
    pub connected_at: Instant,
}

impl LiveSession {
    fn new(identity: Identity, name: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity,
            name,
            phase: SessionPhase::Loading,
            mirror: PlayerSnapshot::default(),
            clear_effects_on_respawn: false,
            loaded_from_store: false,
            connected_at: Instant::now(),
        }
    }
}

/// Sessions currently live on this node, keyed by identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Identity, LiveSession>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session in [`SessionPhase::Loading`], replacing any stale entry.
    pub fn open(&self, identity: Identity, name: String) -> Uuid {
        let session = LiveSession::new(identity, name);
        let session_id = session.session_id;
        self.sessions.insert(identity, session);
        session_id
    }

    /// Remove the session of `identity`, returning it.
    pub fn close(&self, identity: Identity) -> Option<LiveSession> {
        self.sessions.remove(&identity).map(|(_, session)| session)
    }

    /// Phase of `identity`; [`SessionPhase::Offline`] when no session exists.
    pub fn phase(&self, identity: Identity) -> SessionPhase {
        self.sessions
            .get(&identity)
            .map(|session| session.phase)
            .unwrap_or(SessionPhase::Offline)
    }

    /// Set the phase of a live session. No-op when absent.
    pub fn set_phase(&self, identity: Identity, phase: SessionPhase) {
        if let Some(mut session) = self.sessions.get_mut(&identity) {
            session.phase = phase;
        }
    }

    /// Whether `identity` has a live session.
    pub fn contains(&self, identity: Identity) -> bool {
        self.sessions.contains_key(&identity)
    }

    /// Whether `session_id` is still the live session of `identity`.
    pub fn is_current(&self, identity: Identity, session_id: Uuid) -> bool {
        self.sessions
            .get(&identity)
            .is_some_and(|session| session.session_id == session_id)
    }

    /// Current session id of `identity`.
    pub fn session_id(&self, identity: Identity) -> Option<Uuid> {
        self.sessions.get(&identity).map(|session| session.session_id)
    }

    /// Identities whose session is currently in `phase`.
    pub fn identities_in(&self, phase: SessionPhase) -> Vec<Identity> {
        self.sessions
            .iter()
            .filter(|session| session.phase == phase)
            .map(|session| *session.key())
            .collect()
    }

    /// Copy of the session, for inspection.
    pub fn get(&self, identity: Identity) -> Option<LiveSession> {
        self.sessions.get(&identity).map(|session| session.clone())
    }

    /// Name and a copy of the mirror, taken at call time.
    pub fn capture(&self, identity: Identity) -> Option<(String, PlayerSnapshot)> {
        self.sessions
            .get(&identity)
            .map(|session| (session.name.clone(), session.mirror.clone()))
    }

    /// Apply a loaded record to the mirror when `session_id` is still current.
    pub fn apply_record(&self, identity: Identity, session_id: Uuid, record: PersistedRecord) -> bool {
        match self.sessions.get_mut(&identity) {
            Some(mut session) if session.session_id == session_id => {
                session.mirror = record.snapshot.normalized();
                session.loaded_from_store = true;
                true
            }
            _ => false,
        }
    }

    /// Replace the mirror with fresh live state. Only accepted while active.
    pub fn update_mirror(&self, identity: Identity, snapshot: PlayerSnapshot) -> bool {
        match self.sessions.get_mut(&identity) {
            Some(mut session) if session.phase == SessionPhase::Active => {
                session.mirror = snapshot.normalized();
                true
            }
            _ => false,
        }
    }

    /// Set or clear the post-respawn effect clearing flag.
    pub fn set_clear_effects_pending(&self, identity: Identity, pending: bool) {
        if let Some(mut session) = self.sessions.get_mut(&identity) {
            session.clear_effects_on_respawn = pending;
        }
    }

    /// Read and reset the pending effect clear flag.
    pub fn take_clear_effects_pending(&self, identity: Identity) -> bool {
        self.sessions
            .get_mut(&identity)
            .map(|mut session| std::mem::take(&mut session.clear_effects_on_respawn))
            .unwrap_or(false)
    }

    /// Whether a death is waiting for its post-respawn effect clearing.
    pub fn clear_effects_pending(&self, identity: Identity) -> bool {
        self.sessions
            .get(&identity)
            .is_some_and(|session| session.clear_effects_on_respawn)
    }

    /// Drop transient effects from the mirror.
    pub fn clear_mirror_effects(&self, identity: Identity) {
        if let Some(mut session) = self.sessions.get_mut(&identity) {
            session.mirror.effects.clear();
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ItemStack;

    #[test]
    fn stale_load_is_not_applied_to_a_newer_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let first = registry.open(id, "Steve".into());
        let second = registry.open(id, "Steve".into());

        let mut snapshot = PlayerSnapshot::default();
        snapshot.inventory[0] = Some(ItemStack::new("minecraft:stone", 64));
        let record = PersistedRecord::stored(id, "Steve".into(), snapshot, None);

        assert!(!registry.apply_record(id, first, record.clone()));
        assert!(registry.apply_record(id, second, record));
        let session = registry.get(id).unwrap();
        assert!(session.loaded_from_store);
        assert!(session.mirror.inventory[0].is_some());
    }

    #[test]
    fn mirror_updates_require_an_active_session() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.open(id, "Alex".into());

        let mut snapshot = PlayerSnapshot::default();
        snapshot.experience.level = 12;
        assert!(!registry.update_mirror(id, snapshot.clone()));

        registry.set_phase(id, SessionPhase::Active);
        assert!(registry.update_mirror(id, snapshot));
        assert_eq!(registry.capture(id).unwrap().1.experience.level, 12);
    }

    #[test]
    fn closed_identity_reads_as_offline() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.open(id, "Alex".into());
        assert_eq!(registry.phase(id), SessionPhase::Loading);
        assert!(registry.close(id).is_some());
        assert_eq!(registry.phase(id), SessionPhase::Offline);
        assert!(registry.is_empty());
    }

    #[test]
    fn effect_clear_flag_is_consumed_once() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.open(id, "Alex".into());
        registry.set_clear_effects_pending(id, true);
        assert!(registry.take_clear_effects_pending(id));
        assert!(!registry.take_clear_effects_pending(id));
    }
}
