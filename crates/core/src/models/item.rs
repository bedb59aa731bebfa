use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Material identifier treated as "nothing in this slot".
pub const AIR: &str = "air";

/// Stack ceiling used when merging crafted results into a held stack.
pub const DEFAULT_MAX_STACK: u32 = 64;

/// Tag key that marks an item as the capability token of a station type.
pub const STATION_TAG_KEY: &str = "stationcraft:station_type";

/// One stack of an in-game item.
///
/// Matching only ever looks at `material` and `amount`; `meta` is carried
/// along for storage and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValue {
    /// Material / item type discriminator (e.g. `iron_ingot`).
    pub material: String,
    /// Stack size. Zero is the empty sentinel.
    pub amount: u32,
    /// Display name, lore, enchantments and persistent tags.
    #[serde(default, skip_serializing_if = "ItemMeta::is_empty")]
    pub meta: ItemMeta,
}

/// Opaque item metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Custom display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Lore lines shown under the name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,
    /// Enchantment id to level.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enchantments: BTreeMap<String, u32>,
    /// Persistent key/value tags (the station tag lives here).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ItemMeta {
    /// True when no metadata is attached.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.lore.is_empty()
            && self.enchantments.is_empty()
            && self.tags.is_empty()
    }
}

impl ItemValue {
    /// Build a plain stack without metadata.
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self {
            material: material.into(),
            amount,
            meta: ItemMeta::default(),
        }
    }

    /// Builder-style display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.meta.display_name = Some(name.into());
        self
    }

    /// Same item with a different stack size.
    pub fn with_amount(&self, amount: u32) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }

    /// Air or a zero-sized stack.
    pub fn is_empty(&self) -> bool {
        self.amount == 0 || self.material.eq_ignore_ascii_case(AIR)
    }

    /// Same material, ignoring amount and metadata.
    pub fn same_identity(&self, other: &ItemValue) -> bool {
        self.material == other.material
    }

    /// Same material and metadata, ignoring amount. Stacks that are similar may merge.
    pub fn is_similar(&self, other: &ItemValue) -> bool {
        self.same_identity(other) && self.meta == other.meta
    }

    /// Largest stack this item may form.
    pub fn max_stack(&self) -> u32 {
        DEFAULT_MAX_STACK
    }

    /// Station type this item is a capability token for, if any.
    pub fn station_tag(&self) -> Option<&str> {
        self.meta.tags.get(STATION_TAG_KEY).map(String::as_str)
    }

    /// Move as much of `other` onto this stack as fits; returns what is left.
    ///
    /// Stacks that are not similar are left alone and `other` comes back whole.
    pub fn merge(&mut self, other: ItemValue) -> Option<ItemValue> {
        if !self.is_similar(&other) {
            return Some(other);
        }
        let room = self.max_stack().saturating_sub(self.amount);
        let moved = room.min(other.amount);
        self.amount += moved;
        let left = other.amount - moved;
        (left > 0).then(|| other.with_amount(left))
    }

    /// Stamp the item as the capability token of `station_type`.
    pub fn tagged_for(mut self, station_type: &str) -> Self {
        self.meta
            .tags
            .insert(STATION_TAG_KEY.to_string(), station_type.to_string());
        self
    }
}

/// True when the slot holds nothing usable.
pub(crate) fn slot_is_empty(slot: Option<&ItemValue>) -> bool {
    slot.map(ItemValue::is_empty).unwrap_or(true)
}
