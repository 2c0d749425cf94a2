use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::dao::models::Identity;

/// Collapses bursts of progress-change saves per identity.
///
/// A save is accepted when no save for the same identity was accepted within the last
/// `window`. Accepting records the time; suppression leaves it untouched, so a steady
/// stream of changes yields one save per window.
pub struct DebounceGuard {
    window: Duration,
    last_accepted: DashMap<Identity, Instant>,
}

impl DebounceGuard {
    /// Guard collapsing saves that land within `window` of the previous one.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: DashMap::new(),
        }
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check-and-set against the current time.
    pub fn try_accept(&self, identity: Identity) -> bool {
        self.try_accept_at(identity, Instant::now())
    }

    /// Check-and-set against `now`. The entry lock makes concurrent callers agree on one winner.
    pub fn try_accept_at(&self, identity: Identity, now: Instant) -> bool {
        match self.last_accepted.entry(identity) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) < self.window {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drop the identity; its next change is accepted immediately.
    pub fn forget(&self, identity: Identity) {
        self.last_accepted.remove(&identity);
    }

    /// When the last save of `identity` was let through.
    pub fn last_accepted(&self, identity: Identity) -> Option<Instant> {
        self.last_accepted.get(&identity).map(|entry| *entry)
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    /// Whether no identity is tracked.
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}
