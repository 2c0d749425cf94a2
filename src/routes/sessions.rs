use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        DispatchResponse, LifecycleEventRequest, LiveStateRequest, LiveStateResponse, SessionView,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Endpoints the game server uses to report session lifecycle and live state.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/events", post(post_event))
        .route("/sessions/{id}/state", put(put_live_state))
}

/// Inspect the live session of a player on this node.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Live session", body = SessionView),
        (status = 404, description = "No live session for this identity")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, id)?))
}

/// Report a lifecycle event. Disconnects answer only after the final save completed.
#[utoipa::path(
    post,
    path = "/sessions/{id}/events",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Player identity")),
    request_body = LifecycleEventRequest,
    responses(
        (status = 200, description = "Event handled", body = DispatchResponse),
        (status = 400, description = "Invalid event payload"),
        (status = 503, description = "Engine stopped")
    )
)]
pub async fn post_event(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<LifecycleEventRequest>>,
) -> Result<Json<DispatchResponse>, AppError> {
    Ok(Json(session_service::post_event(&state, id, payload).await?))
}

/// Push the current live state of an active session.
#[utoipa::path(
    put,
    path = "/sessions/{id}/state",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Player identity")),
    request_body = LiveStateRequest,
    responses(
        (status = 200, description = "Whether the session accepted the update", body = LiveStateResponse),
        (status = 400, description = "Invalid snapshot")
    )
)]
pub async fn put_live_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<LiveStateRequest>>,
) -> Result<Json<LiveStateResponse>, AppError> {
    Ok(Json(
        session_service::put_live_state(&state, id, payload).await?,
    ))
}
