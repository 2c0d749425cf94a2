use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::dao::{
    player_store::{PlayerStore, StoreSlot},
    storage::StorageError,
};

/// Backoff and polling parameters of [`run`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorPolicy {
    /// First reconnect pause.
    pub initial_delay: Duration,
    /// Ceiling for the doubling pause.
    pub max_delay: Duration,
    /// Interval between health checks while connected.
    pub health_poll_interval: Duration,
    /// Reconnect attempts before a fresh connection is built.
    pub max_reconnect_attempts: u32,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(10),
            health_poll_interval: Duration::from_secs(5),
            max_reconnect_attempts: 3,
        }
    }
}

/// Reconnect to the storage backend and keep the slot in degraded mode while it is unavailable.
pub async fn run<F, Fut>(slot: Arc<StoreSlot>, policy: SupervisorPolicy, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PlayerStore>, StorageError>> + Send,
{
    let mut delay = policy.initial_delay;

    loop {
        match connect().await {
            Ok(store) => {
                slot.install(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = policy.initial_delay;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if slot.is_degraded() {
                                info!("storage healthy again; leaving degraded mode");
                                slot.update_degraded(false);
                            }
                            sleep(policy.health_poll_interval).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "storage health check failed");
                            if reconnect(&slot, store.as_ref(), &policy).await {
                                slot.update_degraded(false);
                                sleep(policy.health_poll_interval).await;
                                continue;
                            }
                            warn!("exhausted storage reconnect attempts; staying in degraded mode");
                            slot.clear().await;
                            break;
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                slot.update_degraded(true);
                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }
}

async fn reconnect(slot: &StoreSlot, store: &dyn PlayerStore, policy: &SupervisorPolicy) -> bool {
    let mut reconnect_delay = policy.initial_delay;

    for attempt in 0..policy.max_reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    slot.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(policy.max_delay);
            }
        }
    }
    false
}
