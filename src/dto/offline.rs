//! DTOs of the offline edit endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{ItemStack, OfflineLookup, Slot},
    dto::{
        format_system_time,
        validation::{validate_item_stack, validate_player_name},
    },
    services::offline_edit::{CommitOutcome, OfflineEditSession},
    state::inventory_view::ViewKind,
};

/// Region of the record an edit works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewKindDto {
    /// Main inventory, armor and off-hand as one 45-slot grid.
    Inventory,
    /// The 27 ender storage slots.
    Ender,
}

impl From<ViewKindDto> for ViewKind {
    fn from(kind: ViewKindDto) -> Self {
        match kind {
            ViewKindDto::Inventory => ViewKind::Main,
            ViewKindDto::Ender => ViewKind::Ender,
        }
    }
}

impl From<ViewKind> for ViewKindDto {
    fn from(kind: ViewKind) -> Self {
        match kind {
            ViewKind::Main => ViewKindDto::Inventory,
            ViewKind::Ender => ViewKindDto::Ender,
        }
    }
}

/// Request to open an offline edit. Exactly one of `target` and `name` must be set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Identity of the operator opening the edit.
    pub editor: Uuid,
    /// Identity of the offline player.
    #[serde(default)]
    pub target: Option<Uuid>,
    /// Last known display name of the target, matched case-insensitively.
    #[serde(default)]
    pub name: Option<String>,
    /// Region to edit.
    pub view: ViewKindDto,
}

impl CheckoutRequest {
    /// Lookup designated by the request; call after validation.
    pub fn lookup(&self) -> Option<OfflineLookup> {
        match (&self.target, &self.name) {
            (Some(target), None) => Some(OfflineLookup::Identity(*target)),
            (None, Some(name)) => Some(OfflineLookup::Name(name.clone())),
            _ => None,
        }
    }
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.target.is_some() == self.name.is_some() {
            let mut err = ValidationError::new("checkout_lookup");
            err.message = Some("Exactly one of `target` or `name` must be provided".into());
            errors.add("target", err);
        }

        if let Some(ref name) = self.name {
            if let Err(e) = validate_player_name(name) {
                errors.add("name", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// New content of one view slot; `null` empties it.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SlotUpdateRequest {
    /// Item to place.
    #[serde(default)]
    #[validate(custom(function = "validate_item_stack"))]
    pub item: Option<ItemStack>,
}

/// An open offline edit.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfflineEditView {
    /// Edit id.
    pub id: Uuid,
    /// Operator who opened the edit.
    pub editor: Uuid,
    /// Player whose record is edited.
    pub target: Uuid,
    /// Last known display name of the target.
    pub name: String,
    /// Edited region.
    pub view: ViewKindDto,
    /// Whether the target had a stored record when the edit was opened.
    pub exists_in_database: bool,
    /// Current view content.
    pub slots: Vec<Slot>,
    /// Whether an editable slot changed since checkout.
    pub dirty: bool,
    /// RFC 3339 checkout time.
    pub opened_at: String,
}

impl From<OfflineEditSession> for OfflineEditView {
    fn from(edit: OfflineEditSession) -> Self {
        Self {
            id: edit.id,
            editor: edit.editor,
            target: edit.target,
            view: edit.view.kind().into(),
            dirty: edit.view.is_dirty(),
            slots: edit.view.slots().to_vec(),
            name: edit.record.name,
            exists_in_database: edit.record.exists_in_database,
            opened_at: format_system_time(edit.opened_at),
        }
    }
}

/// Result of committing an offline edit.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommitResponse {
    /// `saved`, or `unchanged` when nothing editable changed and the store was not called.
    pub outcome: String,
}

impl From<CommitOutcome> for CommitResponse {
    fn from(outcome: CommitOutcome) -> Self {
        let outcome = match outcome {
            CommitOutcome::Saved => "saved",
            CommitOutcome::Unchanged => "unchanged",
        };
        Self {
            outcome: outcome.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_requires_exactly_one_lookup() {
        let both: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "editor": Uuid::new_v4(),
            "target": Uuid::new_v4(),
            "name": "Steve",
            "view": "inventory",
        }))
        .unwrap();
        assert!(both.validate().is_err());

        let neither: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "editor": Uuid::new_v4(),
            "view": "ender",
        }))
        .unwrap();
        assert!(neither.validate().is_err());

        let by_name: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "editor": Uuid::new_v4(),
            "name": "Steve",
            "view": "ender",
        }))
        .unwrap();
        assert!(by_name.validate().is_ok());
        assert_eq!(by_name.lookup(), Some(OfflineLookup::Name("Steve".into())));
    }

    #[test]
    fn slot_update_checks_stack_amount() {
        let ok: SlotUpdateRequest =
            serde_json::from_str(r#"{"item": {"kind": "minecraft:stone", "amount": 64}}"#).unwrap();
        assert!(ok.validate().is_ok());

        let empty: SlotUpdateRequest = serde_json::from_str(r#"{"item": null}"#).unwrap();
        assert!(empty.validate().is_ok());

        let too_many: SlotUpdateRequest =
            serde_json::from_str(r#"{"item": {"kind": "minecraft:stone", "amount": 120}}"#)
                .unwrap();
        assert!(too_many.validate().is_err());
    }
}
