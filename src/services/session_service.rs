use uuid::Uuid;

use crate::{
    dto::session::{DispatchResponse, LifecycleEventRequest, LiveStateRequest, LiveStateResponse, SessionView},
    error::ServiceError,
    state::SharedState,
};

/// Live session of `identity` on this node.
pub fn get_session(state: &SharedState, identity: Uuid) -> Result<SessionView, ServiceError> {
    state
        .engine()
        .session(identity)
        .map(SessionView::from)
        .ok_or_else(|| ServiceError::NotFound(format!("no live session for `{identity}`")))
}

/// Hand a lifecycle event to the dispatcher and wait for it to be applied.
pub async fn post_event(
    state: &SharedState,
    identity: Uuid,
    request: LifecycleEventRequest,
) -> Result<DispatchResponse, ServiceError> {
    let outcome = state.engine().dispatch(identity, request.into()).await?;
    Ok(outcome.into())
}

/// Replace the mirror of an active session.
pub async fn put_live_state(
    state: &SharedState,
    identity: Uuid,
    request: LiveStateRequest,
) -> Result<LiveStateResponse, ServiceError> {
    let applied = state
        .engine()
        .update_live_state(identity, request.snapshot)
        .await?;
    Ok(LiveStateResponse { applied })
}
