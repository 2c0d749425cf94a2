use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Respond with the node health while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().require().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let status = if state.store().is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        server: state.settings().server.id.clone(),
        sessions: state.engine().session_count(),
        offline_edits: state.engine().offline_edits().len(),
        event_streams: state.sse().subscriber_count(),
    }
}
