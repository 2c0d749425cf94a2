use uuid::Uuid;

use crate::{
    dto::offline::{CheckoutRequest, CommitResponse, OfflineEditView, SlotUpdateRequest},
    error::ServiceError,
    state::SharedState,
};

/// Open an offline edit of the record designated by the request.
pub async fn checkout(
    state: &SharedState,
    request: CheckoutRequest,
) -> Result<OfflineEditView, ServiceError> {
    let lookup = request.lookup().ok_or_else(|| {
        ServiceError::InvalidInput("exactly one of `target` or `name` must be provided".into())
    })?;
    let edit = state
        .engine()
        .checkout_offline(request.editor, lookup, request.view.into())
        .await?;
    Ok(edit.into())
}

/// Current view of an open edit.
pub fn get_edit(state: &SharedState, edit: Uuid) -> Result<OfflineEditView, ServiceError> {
    state
        .engine()
        .offline_edits()
        .get(edit)
        .map(OfflineEditView::from)
        .ok_or_else(|| ServiceError::NotFound(format!("offline edit `{edit}` does not exist")))
}

/// Set one slot and return the updated edit.
pub fn set_slot(
    state: &SharedState,
    edit: Uuid,
    index: usize,
    request: SlotUpdateRequest,
) -> Result<OfflineEditView, ServiceError> {
    state.engine().set_offline_slot(edit, index, request.item)?;
    get_edit(state, edit)
}

/// Commit an open edit.
pub async fn commit(state: &SharedState, edit: Uuid) -> Result<CommitResponse, ServiceError> {
    let outcome = state.engine().commit_offline(edit).await?;
    Ok(outcome.into())
}

/// Drop an open edit without writing it.
pub fn abandon(state: &SharedState, edit: Uuid) -> Result<(), ServiceError> {
    if state.engine().offline_edits().abandon(edit) {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!(
            "offline edit `{edit}` does not exist"
        )))
    }
}
