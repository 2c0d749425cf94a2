//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::models::{
    ARMOR_SIZE, ENDER_STORAGE_SIZE, ItemStack, MAIN_INVENTORY_SIZE, PlayerSnapshot, Slot,
};

/// Largest stack size accepted from clients.
pub const MAX_STACK_AMOUNT: u8 = 99;

/// Validates a player display name: 1 to 16 characters of `[A-Za-z0-9_]`.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Steve_01") // Ok
/// validate_player_name("")         // Err - empty
/// validate_player_name("bad name") // Err - space
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > 16 {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!(
                "Player name must be between 1 and 16 characters (got {})",
                name.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name may only contain letters, digits and underscores".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a single stack: non-empty item kind and an amount in `1..=99`.
pub fn validate_item_stack(item: &ItemStack) -> Result<(), ValidationError> {
    if item.kind.trim().is_empty() {
        let mut err = ValidationError::new("item_kind_empty");
        err.message = Some("Item kind must not be empty".into());
        return Err(err);
    }
    if !(1..=MAX_STACK_AMOUNT).contains(&item.amount) {
        let mut err = ValidationError::new("item_amount_range");
        err.message = Some(
            format!(
                "Item amount must be between 1 and {MAX_STACK_AMOUNT} (got {})",
                item.amount
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates slot counts and every stack of a live snapshot.
pub fn validate_snapshot(snapshot: &PlayerSnapshot) -> Result<(), ValidationError> {
    let regions = [
        ("inventory", snapshot.inventory.len(), MAIN_INVENTORY_SIZE),
        ("armor", snapshot.armor.len(), ARMOR_SIZE),
        ("ender_storage", snapshot.ender_storage.len(), ENDER_STORAGE_SIZE),
    ];
    for (region, len, max) in regions {
        if len > max {
            let mut err = ValidationError::new("snapshot_region_size");
            err.message = Some(format!("{region} holds at most {max} slots (got {len})").into());
            return Err(err);
        }
    }

    snapshot
        .inventory
        .iter()
        .chain(&snapshot.armor)
        .chain(&snapshot.ender_storage)
        .chain(std::iter::once(&snapshot.offhand))
        .filter_map(Slot::as_ref)
        .try_for_each(validate_item_stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_name_valid() {
        assert!(validate_player_name("Steve").is_ok());
        assert!(validate_player_name("jeb_").is_ok());
        assert!(validate_player_name("A").is_ok());
        assert!(validate_player_name("abcdefghijklmnop").is_ok());
    }

    #[test]
    fn test_validate_player_name_invalid() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name("abcdefghijklmnopq").is_err()); // 17 chars
        assert!(validate_player_name("bad name").is_err());
        assert!(validate_player_name("dash-name").is_err());
    }

    #[test]
    fn test_validate_item_stack_amount() {
        assert!(validate_item_stack(&ItemStack::new("minecraft:stone", 64)).is_ok());
        assert!(validate_item_stack(&ItemStack::new("minecraft:stone", 99)).is_ok());
        assert!(validate_item_stack(&ItemStack::new("minecraft:stone", 0)).is_err());
        assert!(validate_item_stack(&ItemStack::new("minecraft:stone", 100)).is_err());
        assert!(validate_item_stack(&ItemStack::new(" ", 1)).is_err());
    }

    #[test]
    fn test_validate_snapshot() {
        let mut snapshot = PlayerSnapshot::default();
        assert!(validate_snapshot(&snapshot).is_ok());

        snapshot.offhand = Some(ItemStack::new("minecraft:shield", 0));
        assert!(validate_snapshot(&snapshot).is_err());

        snapshot.offhand = None;
        snapshot.armor.push(None);
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
