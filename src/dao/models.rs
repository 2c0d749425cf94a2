use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Stable key identifying a player across nodes and sessions.
pub type Identity = Uuid;

/// Number of main inventory slots (hotbar included).
pub const MAIN_INVENTORY_SIZE: usize = 36;
/// Number of armor slots, stored boots first.
pub const ARMOR_SIZE: usize = 4;
/// Number of ender storage slots.
pub const ENDER_STORAGE_SIZE: usize = 27;

/// A single stack of items occupying one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemStack {
    /// Namespaced item identifier (e.g. `minecraft:diamond_sword`).
    pub kind: String,
    /// Stack size.
    pub amount: u8,
    /// Opaque serialized item data (enchantments, names, ...), passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ItemStack {
    /// Build a stack without extra item data.
    pub fn new(kind: impl Into<String>, amount: u8) -> Self {
        Self {
            kind: kind.into(),
            amount,
            data: None,
        }
    }
}

/// Content of a single slot; `None` is an empty slot.
pub type Slot = Option<ItemStack>;

/// Experience counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Experience {
    /// Current level.
    pub level: i32,
    /// Progress towards the next level in `[0, 1)`.
    pub progress: f32,
    /// Total experience points collected.
    pub total: i32,
}

/// A transient status effect (potion effect) active on the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusEffect {
    /// Namespaced effect identifier.
    pub kind: String,
    /// Effect amplifier, zero based.
    pub amplifier: u8,
    /// Remaining duration in game ticks.
    pub remaining_ticks: u32,
}

/// Live, savable player state mirrored by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlayerSnapshot {
    /// Main inventory, always [`MAIN_INVENTORY_SIZE`] slots.
    #[serde(default)]
    pub inventory: Vec<Slot>,
    /// Armor slots ordered boots, leggings, chestplate, helmet.
    #[serde(default)]
    pub armor: Vec<Slot>,
    /// Off-hand slot.
    #[serde(default)]
    pub offhand: Slot,
    /// Ender storage, always [`ENDER_STORAGE_SIZE`] slots.
    #[serde(default)]
    pub ender_storage: Vec<Slot>,
    /// Experience counters.
    #[serde(default)]
    pub experience: Experience,
    /// Advancement key mapped to the criteria already awarded.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub advancements: IndexMap<String, Vec<String>>,
    /// Transient status effects.
    #[serde(default)]
    pub effects: Vec<StatusEffect>,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            inventory: empty_slots(MAIN_INVENTORY_SIZE),
            armor: empty_slots(ARMOR_SIZE),
            offhand: None,
            ender_storage: empty_slots(ENDER_STORAGE_SIZE),
            experience: Experience::default(),
            advancements: IndexMap::new(),
            effects: Vec::new(),
        }
    }
}

impl PlayerSnapshot {
    /// Pad or truncate every slot sequence to its fixed length.
    pub fn normalized(mut self) -> Self {
        self.inventory.resize(MAIN_INVENTORY_SIZE, None);
        self.armor.resize(ARMOR_SIZE, None);
        self.ender_storage.resize(ENDER_STORAGE_SIZE, None);
        self
    }

    /// True when no slot holds an item.
    pub fn is_empty_inventory(&self) -> bool {
        self.inventory.iter().all(Option::is_none)
            && self.armor.iter().all(Option::is_none)
            && self.offhand.is_none()
            && self.ender_storage.iter().all(Option::is_none)
    }
}

/// Durable per-identity record as stored by a [`crate::dao::player_store::PlayerStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Identity owning the record.
    pub identity: Identity,
    /// Last display name seen for the identity, used for name lookups.
    pub name: String,
    /// Saved player state.
    pub snapshot: PlayerSnapshot,
    /// False when the store had no record and this one was synthesized.
    pub exists_in_database: bool,
    /// Time of the last write, if any.
    pub last_saved: Option<SystemTime>,
}

impl PersistedRecord {
    /// Synthesize the record returned for an identity the store does not know.
    ///
    /// Every slot sequence is present and fully empty.
    pub fn absent(identity: Identity, name: impl Into<String>) -> Self {
        Self {
            identity,
            name: name.into(),
            snapshot: PlayerSnapshot::default(),
            exists_in_database: false,
            last_saved: None,
        }
    }

    /// Build a record from stored parts, normalizing slot lengths.
    pub fn stored(
        identity: Identity,
        name: String,
        snapshot: PlayerSnapshot,
        last_saved: Option<SystemTime>,
    ) -> Self {
        Self {
            identity,
            name,
            snapshot: snapshot.normalized(),
            exists_in_database: true,
            last_saved,
        }
    }
}

/// How tooling designates the record to check out for an offline edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineLookup {
    /// Exact identity.
    Identity(Identity),
    /// Display name hint, matched case-insensitively against the last known name.
    Name(String),
}

impl std::fmt::Display for OfflineLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfflineLookup::Identity(id) => write!(f, "{id}"),
            OfflineLookup::Name(name) => write!(f, "name `{name}`"),
        }
    }
}

/// Allocate `len` empty slots.
pub fn empty_slots(len: usize) -> Vec<Slot> {
    vec![None; len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_record_has_full_empty_sequences() {
        let record = PersistedRecord::absent(Uuid::new_v4(), "Steve");
        assert!(!record.exists_in_database);
        assert_eq!(record.snapshot.inventory.len(), MAIN_INVENTORY_SIZE);
        assert_eq!(record.snapshot.armor.len(), ARMOR_SIZE);
        assert_eq!(record.snapshot.ender_storage.len(), ENDER_STORAGE_SIZE);
        assert!(record.snapshot.is_empty_inventory());
    }

    #[test]
    fn missing_fields_deserialize_to_normalized_lengths() {
        let snapshot: PlayerSnapshot =
            serde_json::from_str(r#"{"inventory":[{"kind":"minecraft:stone","amount":3}]}"#)
                .unwrap();
        let snapshot = snapshot.normalized();
        assert_eq!(snapshot.inventory.len(), MAIN_INVENTORY_SIZE);
        assert_eq!(snapshot.inventory[0], Some(ItemStack::new("minecraft:stone", 3)));
        assert_eq!(snapshot.armor.len(), ARMOR_SIZE);
        assert_eq!(snapshot.ender_storage.len(), ENDER_STORAGE_SIZE);
    }

    #[test]
    fn oversized_sequences_are_truncated() {
        let mut snapshot = PlayerSnapshot::default();
        snapshot.ender_storage = vec![Some(ItemStack::new("minecraft:dirt", 1)); 40];
        let snapshot = snapshot.normalized();
        assert_eq!(snapshot.ender_storage.len(), ENDER_STORAGE_SIZE);
    }
}
