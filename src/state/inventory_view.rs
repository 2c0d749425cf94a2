//! Editable views over a stored record, used by offline edits.
//!
//! The main view is a flat 45-slot grid:
//!
//! | index   | contents                                  |
//! |---------|-------------------------------------------|
//! | 0..=35  | main inventory                            |
//! | 36..=39 | armor, helmet first (armor index `39 - i`) |
//! | 40      | off-hand                                  |
//! | 41..=44 | padding, never written back               |

use std::collections::BTreeSet;

use thiserror::Error;

use crate::dao::models::{ARMOR_SIZE, ENDER_STORAGE_SIZE, MAIN_INVENTORY_SIZE, PlayerSnapshot, Slot, empty_slots};

/// Total slots of the main view.
pub const MAIN_VIEW_SIZE: usize = 45;
/// First armor slot of the main view.
pub const ARMOR_VIEW_START: usize = MAIN_INVENTORY_SIZE;
/// Off-hand slot of the main view.
pub const OFFHAND_VIEW_SLOT: usize = ARMOR_VIEW_START + ARMOR_SIZE;
/// Highest main-view slot that maps onto the record.
const LAST_MAPPED_SLOT: usize = OFFHAND_VIEW_SLOT;

/// Slot index outside the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("slot {index} is out of range for a view of {size} slots")]
pub struct SlotOutOfRange {
    /// Requested slot.
    pub index: usize,
    /// Slots in the view.
    pub size: usize,
}

/// Which region of a record an offline edit works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Main inventory, armor and off-hand.
    Main,
    /// Ender storage.
    Ender,
}

/// Main inventory, armor and off-hand of a record, laid out as one grid.
#[derive(Debug, Clone)]
pub struct InventoryView {
    slots: Vec<Slot>,
    dirty: BTreeSet<usize>,
}

impl InventoryView {
    /// Build the view from a snapshot.
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Self {
        let mut slots = empty_slots(MAIN_VIEW_SIZE);
        for (index, slot) in snapshot.inventory.iter().take(MAIN_INVENTORY_SIZE).enumerate() {
            slots[index] = slot.clone();
        }
        for (armor_index, slot) in snapshot.armor.iter().take(ARMOR_SIZE).enumerate() {
            slots[armor_view_slot(armor_index)] = slot.clone();
        }
        slots[OFFHAND_VIEW_SLOT] = snapshot.offhand.clone();
        Self {
            slots,
            dirty: BTreeSet::new(),
        }
    }

    /// Every slot, in view order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Slot `index`.
    pub fn slot(&self, index: usize) -> Result<&Slot, SlotOutOfRange> {
        self.slots.get(index).ok_or(SlotOutOfRange {
            index,
            size: MAIN_VIEW_SIZE,
        })
    }

    /// Place `item` in `index`. Padding slots accept writes but stay clean.
    pub fn set(&mut self, index: usize, item: Slot) -> Result<(), SlotOutOfRange> {
        let slot = self.slots.get_mut(index).ok_or(SlotOutOfRange {
            index,
            size: MAIN_VIEW_SIZE,
        })?;
        *slot = item;
        if index <= LAST_MAPPED_SLOT {
            self.dirty.insert(index);
        }
        Ok(())
    }

    /// Whether an editable slot changed.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Copy slots 0..=40 back into the snapshot. Padding is dropped.
    pub fn write_back(&self, snapshot: &mut PlayerSnapshot) {
        snapshot.inventory = self.slots[..MAIN_INVENTORY_SIZE].to_vec();
        snapshot.armor = (0..ARMOR_SIZE)
            .map(|armor_index| self.slots[armor_view_slot(armor_index)].clone())
            .collect();
        snapshot.offhand = self.slots[OFFHAND_VIEW_SLOT].clone();
    }
}

/// View slot holding armor index `armor_index` (0 = boots).
fn armor_view_slot(armor_index: usize) -> usize {
    ARMOR_VIEW_START + ARMOR_SIZE - 1 - armor_index
}

/// Ender storage of a record.
#[derive(Debug, Clone)]
pub struct EnderView {
    slots: Vec<Slot>,
    dirty: BTreeSet<usize>,
}

impl EnderView {
    /// View over the ender storage of `snapshot`.
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Self {
        let mut slots = snapshot.ender_storage.clone();
        slots.resize(ENDER_STORAGE_SIZE, None);
        Self {
            slots,
            dirty: BTreeSet::new(),
        }
    }

    /// Every slot.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Replace slot `index`.
    pub fn set(&mut self, index: usize, item: Slot) -> Result<(), SlotOutOfRange> {
        let slot = self.slots.get_mut(index).ok_or(SlotOutOfRange {
            index,
            size: ENDER_STORAGE_SIZE,
        })?;
        *slot = item;
        self.dirty.insert(index);
        Ok(())
    }

    /// Whether a slot changed.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Copy the slots back into `snapshot`.
    pub fn write_back(&self, snapshot: &mut PlayerSnapshot) {
        snapshot.ender_storage = self.slots.clone();
    }
}

/// Either view, as held by an edit session.
#[derive(Debug, Clone)]
pub enum RecordView {
    /// Main inventory view.
    Main(InventoryView),
    /// Ender storage view.
    Ender(EnderView),
}

impl RecordView {
    /// Open a view of `kind` over `snapshot`.
    pub fn open(kind: ViewKind, snapshot: &PlayerSnapshot) -> Self {
        match kind {
            ViewKind::Main => RecordView::Main(InventoryView::from_snapshot(snapshot)),
            ViewKind::Ender => RecordView::Ender(EnderView::from_snapshot(snapshot)),
        }
    }

    /// Region this view covers.
    pub fn kind(&self) -> ViewKind {
        match self {
            RecordView::Main(_) => ViewKind::Main,
            RecordView::Ender(_) => ViewKind::Ender,
        }
    }

    /// Every slot, in view order.
    pub fn slots(&self) -> &[Slot] {
        match self {
            RecordView::Main(view) => view.slots(),
            RecordView::Ender(view) => view.slots(),
        }
    }

    /// Replace slot `index`.
    pub fn set(&mut self, index: usize, item: Slot) -> Result<(), SlotOutOfRange> {
        match self {
            RecordView::Main(view) => view.set(index, item),
            RecordView::Ender(view) => view.set(index, item),
        }
    }

    /// Whether an editable slot changed.
    pub fn is_dirty(&self) -> bool {
        match self {
            RecordView::Main(view) => view.is_dirty(),
            RecordView::Ender(view) => view.is_dirty(),
        }
    }

    /// Copy the editable region back into `snapshot`.
    pub fn write_back(&self, snapshot: &mut PlayerSnapshot) {
        match self {
            RecordView::Main(view) => view.write_back(snapshot),
            RecordView::Ender(view) => view.write_back(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ItemStack;

    fn stack(kind: &str) -> Slot {
        Some(ItemStack::new(kind, 1))
    }

    #[test]
    fn armor_is_laid_out_helmet_first() {
        let mut snapshot = PlayerSnapshot::default();
        snapshot.armor = vec![
            stack("minecraft:iron_boots"),
            stack("minecraft:iron_leggings"),
            stack("minecraft:iron_chestplate"),
            stack("minecraft:iron_helmet"),
        ];
        snapshot.offhand = stack("minecraft:shield");

        let view = InventoryView::from_snapshot(&snapshot);
        assert_eq!(view.slots().len(), MAIN_VIEW_SIZE);
        assert_eq!(view.slot(36).unwrap(), &stack("minecraft:iron_helmet"));
        assert_eq!(view.slot(39).unwrap(), &stack("minecraft:iron_boots"));
        assert_eq!(view.slot(40).unwrap(), &stack("minecraft:shield"));
    }

    #[test]
    fn write_back_maps_every_region_and_drops_padding() {
        let mut snapshot = PlayerSnapshot::default();
        let mut view = InventoryView::from_snapshot(&snapshot);
        view.set(0, stack("minecraft:dirt")).unwrap();
        view.set(36, stack("minecraft:diamond_helmet")).unwrap();
        view.set(39, stack("minecraft:diamond_boots")).unwrap();
        view.set(40, stack("minecraft:totem_of_undying")).unwrap();
        view.set(42, stack("minecraft:barrier")).unwrap();

        view.write_back(&mut snapshot);
        assert_eq!(snapshot.inventory[0], stack("minecraft:dirt"));
        assert_eq!(snapshot.armor[3], stack("minecraft:diamond_helmet"));
        assert_eq!(snapshot.armor[0], stack("minecraft:diamond_boots"));
        assert_eq!(snapshot.offhand, stack("minecraft:totem_of_undying"));
        assert_eq!(snapshot.inventory.len(), MAIN_INVENTORY_SIZE);
        assert!(
            snapshot
                .inventory
                .iter()
                .chain(snapshot.armor.iter())
                .all(|slot| slot.as_ref().is_none_or(|item| item.kind != "minecraft:barrier"))
        );
    }

    #[test]
    fn padding_writes_do_not_make_the_view_dirty() {
        let mut view = InventoryView::from_snapshot(&PlayerSnapshot::default());
        view.set(44, stack("minecraft:barrier")).unwrap();
        assert!(!view.is_dirty());
        assert_eq!(
            view.set(45, None),
            Err(SlotOutOfRange {
                index: 45,
                size: MAIN_VIEW_SIZE
            })
        );
    }

    #[test]
    fn ender_view_covers_exactly_the_ender_storage() {
        let mut snapshot = PlayerSnapshot::default();
        let mut view = RecordView::open(ViewKind::Ender, &snapshot);
        assert_eq!(view.slots().len(), ENDER_STORAGE_SIZE);
        view.set(26, stack("minecraft:elytra")).unwrap();
        assert!(view.set(27, None).is_err());
        assert!(view.is_dirty());

        view.write_back(&mut snapshot);
        assert_eq!(snapshot.ender_storage[26], stack("minecraft:elytra"));
    }
}
