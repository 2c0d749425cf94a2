/// Editable views used by offline edits.
pub mod inventory_view;
/// Live session registry.
pub mod session;
mod sse;
/// Session lifecycle state machine.
pub mod state_machine;

use std::sync::Arc;

use crate::{config::SyncSettings, dao::player_store::StoreSlot, services::engine::SyncEngine};

pub use self::sse::SseHub;

/// State handed to every handler.
pub type SharedState = Arc<AppState>;

/// Capacity of the SSE broadcast channel.
const SSE_CAPACITY: usize = 64;

/// Application state shared by the HTTP handlers.
pub struct AppState {
    store: Arc<StoreSlot>,
    sse: SseHub,
    engine: SyncEngine,
    settings: Arc<SyncSettings>,
}

impl AppState {
    /// Bundle the running engine with the store slot and hub it was started with.
    pub fn new(
        store: Arc<StoreSlot>,
        sse: SseHub,
        engine: SyncEngine,
        settings: Arc<SyncSettings>,
    ) -> SharedState {
        Arc::new(Self {
            store,
            sse,
            engine,
            settings,
        })
    }

    /// Hub sized for the node's event stream.
    pub fn default_hub() -> SseHub {
        SseHub::new(SSE_CAPACITY)
    }

    /// Slot holding the current store backend.
    pub fn store(&self) -> &Arc<StoreSlot> {
        &self.store
    }

    /// Broadcast hub used for the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Running engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Node settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}
