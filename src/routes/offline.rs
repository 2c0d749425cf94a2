use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::offline::{CheckoutRequest, CommitResponse, OfflineEditView, SlotUpdateRequest},
    error::AppError,
    services::offline_service,
    state::SharedState,
};

/// Operator endpoints to edit the stored inventory of offline players.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/offline-edits", post(checkout))
        .route("/offline-edits/{edit}", get(get_edit).delete(abandon))
        .route("/offline-edits/{edit}/slots/{index}", put(set_slot))
        .route("/offline-edits/{edit}/commit", post(commit))
}

/// Check out a stored record for editing.
#[utoipa::path(
    post,
    path = "/offline-edits",
    tag = "offline-edits",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Edit opened", body = OfflineEditView),
        (status = 404, description = "No stored record matches the name"),
        (status = 409, description = "Target is online on this node"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn checkout(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CheckoutRequest>>,
) -> Result<(StatusCode, Json<OfflineEditView>), AppError> {
    let edit = offline_service::checkout(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(edit)))
}

/// Inspect an open edit.
#[utoipa::path(
    get,
    path = "/offline-edits/{edit}",
    tag = "offline-edits",
    params(("edit" = Uuid, Path, description = "Offline edit identifier")),
    responses(
        (status = 200, description = "Open edit", body = OfflineEditView),
        (status = 404, description = "Unknown edit")
    )
)]
pub async fn get_edit(
    State(state): State<SharedState>,
    Path(edit): Path<Uuid>,
) -> Result<Json<OfflineEditView>, AppError> {
    Ok(Json(offline_service::get_edit(&state, edit)?))
}

/// Replace the content of one view slot.
#[utoipa::path(
    put,
    path = "/offline-edits/{edit}/slots/{index}",
    tag = "offline-edits",
    params(
        ("edit" = Uuid, Path, description = "Offline edit identifier"),
        ("index" = usize, Path, description = "View slot: 0-44 for inventory views, 0-26 for ender views")
    ),
    request_body = SlotUpdateRequest,
    responses(
        (status = 200, description = "Updated edit", body = OfflineEditView),
        (status = 400, description = "Slot out of range or invalid item"),
        (status = 404, description = "Unknown edit")
    )
)]
pub async fn set_slot(
    State(state): State<SharedState>,
    Path((edit, index)): Path<(Uuid, usize)>,
    Valid(Json(payload)): Valid<Json<SlotUpdateRequest>>,
) -> Result<Json<OfflineEditView>, AppError> {
    Ok(Json(offline_service::set_slot(&state, edit, index, payload)?))
}

/// Persist the editable region and close the edit.
#[utoipa::path(
    post,
    path = "/offline-edits/{edit}/commit",
    tag = "offline-edits",
    params(("edit" = Uuid, Path, description = "Offline edit identifier")),
    responses(
        (status = 200, description = "Edit committed", body = CommitResponse),
        (status = 404, description = "Unknown edit"),
        (status = 409, description = "Target came online on this node"),
        (status = 503, description = "Storage unavailable; the editor is notified if reachable")
    )
)]
pub async fn commit(
    State(state): State<SharedState>,
    Path(edit): Path<Uuid>,
) -> Result<Json<CommitResponse>, AppError> {
    Ok(Json(offline_service::commit(&state, edit).await?))
}

/// Close an edit without persisting.
#[utoipa::path(
    delete,
    path = "/offline-edits/{edit}",
    tag = "offline-edits",
    params(("edit" = Uuid, Path, description = "Offline edit identifier")),
    responses(
        (status = 204, description = "Edit abandoned"),
        (status = 404, description = "Unknown edit")
    )
)]
pub async fn abandon(
    State(state): State<SharedState>,
    Path(edit): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    offline_service::abandon(&state, edit)?;
    Ok(StatusCode::NO_CONTENT)
}
