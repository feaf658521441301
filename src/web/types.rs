//! Inventory data model (spec §3).
//!
//! Unknown `ItemType`/`Rarity` wire values are carried as `Other(u32)` rather than rejected —
//! the directory and inventory endpoints are both allowed to introduce values this crate
//! doesn't know about yet (spec §6: "unknown values must be logged and ignored"), matching the
//! teacher's tolerant-deserialization style in `scrapers/polymarket.rs`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Platform inventory item (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub asset_id: u64,
    pub class_id: u64,
    pub context_id: u64,
    pub amount: u32,
    pub real_app_id: u32,
    pub item_type: ItemType,
    pub rarity: Rarity,
    pub marketable: bool,
    pub tradable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ItemType {
    TradingCard,
    FoilTradingCard,
    Emoticon,
    ProfileBackground,
    Other(u32),
}

impl ItemType {
    /// The accepted matchable type set used throughout §4.3/§4.4.
    pub const ACCEPTED: [ItemType; 4] = [
        ItemType::Emoticon,
        ItemType::FoilTradingCard,
        ItemType::ProfileBackground,
        ItemType::TradingCard,
    ];

    pub fn is_accepted(&self) -> bool {
        Self::ACCEPTED.contains(self)
    }

    fn wire_id(&self) -> u32 {
        match self {
            ItemType::TradingCard => 2,
            ItemType::FoilTradingCard => 3,
            ItemType::Emoticon => 4,
            ItemType::ProfileBackground => 5,
            ItemType::Other(id) => *id,
        }
    }
}

impl From<u32> for ItemType {
    fn from(id: u32) -> Self {
        match id {
            2 => ItemType::TradingCard,
            3 => ItemType::FoilTradingCard,
            4 => ItemType::Emoticon,
            5 => ItemType::ProfileBackground,
            other => ItemType::Other(other),
        }
    }
}

impl From<ItemType> for u32 {
    fn from(t: ItemType) -> u32 {
        t.wire_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Other(u32),
}

impl From<u32> for Rarity {
    fn from(id: u32) -> Self {
        match id {
            0 => Rarity::Common,
            1 => Rarity::Uncommon,
            2 => Rarity::Rare,
            other => Rarity::Other(other),
        }
    }
}

impl From<Rarity> for u32 {
    fn from(r: Rarity) -> u32 {
        match r {
            Rarity::Common => 0,
            Rarity::Uncommon => 1,
            Rarity::Rare => 2,
            Rarity::Other(id) => id,
        }
    }
}

/// `(realAppID, itemType, rarity)` — matching happens only within one set key (spec §3, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetKey {
    pub real_app_id: u32,
    pub item_type: ItemType,
    pub rarity: Rarity,
}

impl Asset {
    pub fn set_key(&self) -> SetKey {
        SetKey {
            real_app_id: self.real_app_id,
            item_type: self.item_type,
            rarity: self.rarity,
        }
    }
}

/// Two mappings, set key -> (classID -> count): everything owned, and everything tradable.
/// Invariant: for every `(set, classID)`, `tradable <= full` (spec §3, tested in §8.1).
#[derive(Debug, Clone, Default)]
pub struct InventoryState {
    pub full: HashMap<SetKey, HashMap<u64, u32>>,
    pub tradable: HashMap<SetKey, HashMap<u64, u32>>,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build full/tradable partitions from a flat asset list, keyed by set (spec §4.4.1 step 1).
    pub fn from_assets<'a>(assets: impl IntoIterator<Item = &'a Asset>) -> Self {
        let mut state = Self::new();
        for asset in assets {
            let set = asset.set_key();
            *state
                .full
                .entry(set)
                .or_default()
                .entry(asset.class_id)
                .or_insert(0) += asset.amount;
            if asset.tradable {
                *state
                    .tradable
                    .entry(set)
                    .or_default()
                    .entry(asset.class_id)
                    .or_insert(0) += asset.amount;
            }
        }
        state
    }

    /// True if any set has a class with `full count >= 2` ("dupe", glossary; spec §4.4.1 step 2).
    pub fn has_any_duplicate(&self) -> bool {
        self.full
            .values()
            .any(|classes| classes.values().any(|&count| count > 1))
    }

    /// True if the given set has no remaining duplicate in full state.
    pub fn set_is_duplicate_empty(&self, set: &SetKey) -> bool {
        self.full
            .get(set)
            .map(|classes| classes.values().all(|&count| count <= 1))
            .unwrap_or(true)
    }

    pub fn remove_set(&mut self, set: &SetKey) {
        self.full.remove(set);
        self.tradable.remove(set);
    }

    pub fn full_count(&self, set: &SetKey, class_id: u64) -> u32 {
        self.full
            .get(set)
            .and_then(|m| m.get(&class_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn tradable_count(&self, set: &SetKey, class_id: u64) -> u32 {
        self.tradable
            .get(set)
            .and_then(|m| m.get(&class_id))
            .copied()
            .unwrap_or(0)
    }

    /// Asserts the class invariant for every tracked entry (spec §8, invariant 1). Intended for
    /// tests and debug assertions, not the hot path.
    pub fn check_invariant(&self) -> bool {
        self.tradable.iter().all(|(set, classes)| {
            classes
                .iter()
                .all(|(class_id, &count)| count <= self.full_count(set, *class_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(class_id: u64, amount: u32, tradable: bool) -> Asset {
        Asset {
            asset_id: class_id * 100,
            class_id,
            context_id: 6,
            amount,
            real_app_id: 730,
            item_type: ItemType::TradingCard,
            rarity: Rarity::Common,
            marketable: true,
            tradable,
        }
    }

    #[test]
    fn partitions_full_and_tradable_by_set() {
        let assets = vec![asset(1, 2, true), asset(1, 1, false), asset(2, 1, true)];
        let state = InventoryState::from_assets(&assets);
        let set = assets[0].set_key();
        assert_eq!(state.full_count(&set, 1), 3);
        assert_eq!(state.tradable_count(&set, 1), 2);
        assert!(state.check_invariant());
    }

    #[test]
    fn detects_duplicates() {
        let assets = vec![asset(1, 2, true)];
        let state = InventoryState::from_assets(&assets);
        assert!(state.has_any_duplicate());

        let assets = vec![asset(1, 1, true), asset(2, 1, true)];
        let state = InventoryState::from_assets(&assets);
        assert!(!state.has_any_duplicate());
    }

    #[test]
    fn item_type_round_trips_through_wire_id() {
        for t in ItemType::ACCEPTED {
            let id: u32 = t.into();
            assert_eq!(ItemType::from(id), t);
        }
        assert_eq!(ItemType::from(9999), ItemType::Other(9999));
    }
}
