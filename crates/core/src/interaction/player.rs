use std::fmt;

use crate::models::ItemValue;

/// Storage slots in a player's inventory.
pub const STORAGE_SLOTS: usize = 36;

/// Stable id of a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Feedback for a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Editor contents were persisted.
    RecipeSaved {
        /// Saved recipe.
        recipe_id: String,
    },
    /// Editor contents could not be persisted.
    SaveFailed {
        /// Recipe that was being saved.
        recipe_id: String,
        /// Reason reported by the provider.
        reason: String,
    },
    /// Crafting needs a token the player does not carry.
    MissingToken {
        /// Station type of the token.
        station_type: String,
    },
    /// A token was used for a type without recipes.
    NoRecipes {
        /// Station type of the token.
        station_type: String,
    },
    /// Tokens cannot be placed as blocks.
    PlaceProtected,
    /// Tokens cannot be dropped while crafting.
    DropProtected,
    /// Anything else worth telling the player.
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RecipeSaved { recipe_id } => write!(f, "Recipe {recipe_id} saved."),
            Notice::SaveFailed { recipe_id, reason } => {
                write!(f, "Could not save recipe {recipe_id}: {reason}")
            }
            Notice::MissingToken { station_type } => {
                write!(f, "You need a {station_type} station item to craft here.")
            }
            Notice::NoRecipes { station_type } => {
                write!(f, "There are no recipes for {station_type} yet.")
            }
            Notice::PlaceProtected => f.write_str("Station items cannot be placed."),
            Notice::DropProtected => f.write_str("Station items cannot be dropped while crafting."),
            Notice::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// A player's storage plus the stack on their cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    storage: Vec<Option<ItemValue>>,
    cursor: Option<ItemValue>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Empty inventory.
    pub fn new() -> Self {
        Self {
            storage: vec![None; STORAGE_SLOTS],
            cursor: None,
        }
    }

    /// Item in storage slot `index`.
    pub fn slot(&self, index: usize) -> Option<&ItemValue> {
        self.storage.get(index).and_then(Option::as_ref)
    }

    /// Mutable storage slot, `None` past the end.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Option<ItemValue>> {
        self.storage.get_mut(index)
    }

    /// Replace storage slot `index`. False if out of range.
    pub fn set_slot(&mut self, index: usize, item: Option<ItemValue>) -> bool {
        match self.storage.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// All storage slots.
    pub fn contents(&self) -> &[Option<ItemValue>] {
        &self.storage
    }

    /// Stack held on the cursor.
    pub fn cursor(&self) -> Option<&ItemValue> {
        self.cursor.as_ref()
    }

    /// Mutable cursor.
    pub fn cursor_mut(&mut self) -> &mut Option<ItemValue> {
        &mut self.cursor
    }

    /// Put `item` into storage: similar stacks first, then empty slots.
    /// Returns what did not fit.
    pub fn add_item(&mut self, item: ItemValue) -> Option<ItemValue> {
        if item.is_empty() {
            return None;
        }
        let mut left = Some(item);
        for stack in self.storage.iter_mut().flatten().filter(|stack| !stack.is_empty()) {
            let Some(item) = left.take() else { break };
            left = stack.merge(item);
        }
        for slot in self.storage.iter_mut() {
            let Some(item) = left.take() else { break };
            if slot.as_ref().map(ItemValue::is_empty).unwrap_or(true) {
                let max = item.max_stack();
                if item.amount > max {
                    *slot = Some(item.with_amount(max));
                    left = Some(item.with_amount(item.amount - max));
                } else {
                    *slot = Some(item);
                }
            } else {
                left = Some(item);
            }
        }
        left
    }

    /// Storage slot holding a capability token for `station_type`.
    pub fn find_token(&self, station_type: &str) -> Option<usize> {
        self.storage.iter().position(|slot| {
            slot.as_ref()
                .map(|item| !item.is_empty() && item.station_tag() == Some(station_type))
                .unwrap_or(false)
        })
    }

    /// Remove one item from storage slot `index`, clearing it at zero.
    pub fn take_one(&mut self, index: usize) {
        if let Some(slot) = self.storage.get_mut(index) {
            *slot = slot
                .take()
                .filter(|item| item.amount > 1)
                .map(|item| item.with_amount(item.amount - 1));
        }
    }

    /// Total amount of `material` in storage and on the cursor.
    pub fn count(&self, material: &str) -> u32 {
        self.storage
            .iter()
            .chain(std::iter::once(&self.cursor))
            .flatten()
            .filter(|item| item.material == material)
            .map(|item| item.amount)
            .sum()
    }
}

/// Someone interacting with station surfaces.
pub trait Player: Send + 'static {
    /// Stable id.
    fn id(&self) -> PlayerId;
    /// Inventory and cursor.
    fn inventory(&self) -> &Inventory;
    /// Mutable inventory and cursor.
    fn inventory_mut(&mut self) -> &mut Inventory;
    /// Deliver feedback.
    fn notify(&mut self, notice: Notice);
    /// Spill an item into the world at the player's position.
    fn drop_in_world(&mut self, item: ItemValue);

    /// Add to storage, dropping whatever does not fit.
    fn give(&mut self, item: ItemValue) {
        if let Some(overflow) = self.inventory_mut().add_item(item) {
            self.drop_in_world(overflow);
        }
    }
}

/// In-process player that records everything it receives.
#[derive(Debug, Clone)]
pub struct HeadlessPlayer {
    id: PlayerId,
    inventory: Inventory,
    /// Notices delivered so far, oldest first.
    pub notices: Vec<Notice>,
    /// Items spilled into the world.
    pub dropped: Vec<ItemValue>,
}

impl HeadlessPlayer {
    /// Player with an empty inventory.
    pub fn new(id: u64) -> Self {
        Self {
            id: PlayerId(id),
            inventory: Inventory::new(),
            notices: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl Player for HeadlessPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    fn notify(&mut self, notice: Notice) {
        tracing::debug!(player = %self.id, %notice, "Notice");
        self.notices.push(notice);
    }

    fn drop_in_world(&mut self, item: ItemValue) {
        self.dropped.push(item);
    }
}
