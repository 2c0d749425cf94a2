use std::{panic::AssertUnwindSafe, sync::Arc, time::{Duration, Instant}};

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    dao::{
        models::{Identity, PersistedRecord, PlayerSnapshot},
        player_store::StoreSlot,
        storage::StorageError,
    },
    services::execution::ExecutionBridge,
    state::state_machine::SaveReason,
};

/// Everything a save needs, captured on the primary context before the write starts.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Player to save.
    pub identity: Identity,
    /// Last known display name.
    pub name: String,
    /// Normalized copy of the live mirror.
    pub snapshot: PlayerSnapshot,
    /// Trigger that caused the save.
    pub reason: SaveReason,
}

/// Result of reading a record for a connecting session.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Stored record, or a synthesized one for a new player.
    Loaded(PersistedRecord),
    /// The store could not be read.
    Failed,
}

#[derive(Debug, Error)]
enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("store call panicked")]
    Panicked,
}

/// Runs store reads and writes in the execution mode each trigger calls for.
#[derive(Clone)]
pub struct SaveLoadOrchestrator {
    store: Arc<StoreSlot>,
    slow_save_threshold: Duration,
}

impl SaveLoadOrchestrator {
    /// Orchestrator reporting synchronous saves slower than `slow_save_threshold`.
    pub fn new(store: Arc<StoreSlot>, slow_save_threshold: Duration) -> Self {
        Self {
            store,
            slow_save_threshold,
        }
    }

    /// Slot the orchestrator reads the current backend from.
    pub fn store(&self) -> &Arc<StoreSlot> {
        &self.store
    }

    /// Read the record of `identity`. Failures are logged and reported as [`LoadOutcome::Failed`].
    pub fn load(&self, identity: Identity) -> BoxFuture<'static, LoadOutcome> {
        let store = self.store.clone();
        Box::pin(async move {
            let read = async move {
                let store = store.require().await?;
                store.load_record(identity).await
            };
            match AssertUnwindSafe(read).catch_unwind().await {
                Ok(Ok(record)) => {
                    debug!(%identity, exists = record.exists_in_database, "record loaded");
                    LoadOutcome::Loaded(record)
                }
                Ok(Err(err)) => {
                    warn!(%identity, error = %err, "failed to load player record");
                    LoadOutcome::Failed
                }
                Err(_) => {
                    error!(%identity, "record load panicked");
                    LoadOutcome::Failed
                }
            }
        })
    }

    /// Save and block the calling primary context until the write returns.
    pub fn save_sync<C: 'static>(&self, bridge: &ExecutionBridge<C>, request: SaveRequest) -> bool {
        let identity = request.identity;
        let reason = request.reason;
        let started = Instant::now();
        let result = bridge.block_on_worker(persist(self.store.clone(), request));
        let elapsed = started.elapsed();

        if elapsed > self.slow_save_threshold {
            warn!(
                %identity,
                %reason,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.slow_save_threshold.as_millis() as u64,
                "synchronous save exceeded threshold"
            );
        }

        match result {
            Ok(Ok(())) => {
                info!(%identity, %reason, "record saved");
                true
            }
            Ok(Err(err)) => {
                error!(%identity, %reason, error = ?err, "synchronous save failed");
                false
            }
            Err(err) => {
                error!(%identity, %reason, error = %err, "synchronous save task failed");
                false
            }
        }
    }

    /// Save on the worker pool without waiting.
    pub fn save_async<C: 'static>(&self, bridge: &ExecutionBridge<C>, request: SaveRequest) {
        bridge.run_on_worker(save_logged(self.store.clone(), request));
    }

    /// Save on the worker pool, then run `then` on the primary context with the outcome.
    pub fn save_async_then<C, F>(&self, bridge: &ExecutionBridge<C>, request: SaveRequest, then: F)
    where
        C: 'static,
        F: FnOnce(&mut C, bool) + Send + 'static,
    {
        bridge.run_on_worker_then_primary(save_logged(self.store.clone(), request), then);
    }
}

async fn persist(store: Arc<StoreSlot>, request: SaveRequest) -> Result<(), PersistError> {
    let write = async move {
        let store = store.require().await?;
        store
            .save_record(request.identity, request.name, request.snapshot)
            .await
    };
    match AssertUnwindSafe(write).catch_unwind().await {
        Ok(result) => result.map_err(PersistError::from),
        Err(_) => Err(PersistError::Panicked),
    }
}

async fn save_logged(store: Arc<StoreSlot>, request: SaveRequest) -> bool {
    let identity = request.identity;
    let reason = request.reason;
    match persist(store, request).await {
        Ok(()) => {
            debug!(%identity, %reason, "record saved");
            true
        }
        Err(err) => {
            warn!(%identity, %reason, error = %err, "asynchronous save failed");
            false
        }
    }
}
