use super::item::{slot_is_empty, ItemValue};
use crate::station;

/// Number of input slots in a recipe grid.
pub const GRID_SIZE: usize = 9;
/// Position of the result within the persisted slot array.
pub const RESULT_INDEX: usize = GRID_SIZE;
/// Number of slots persisted per recipe (grid + result).
pub const ENCODED_SLOTS: usize = GRID_SIZE + 1;

/// The 3×3 input pattern, row-major.
pub type RecipeGrid = [Option<ItemValue>; GRID_SIZE];

/// An all-empty grid.
pub fn empty_grid() -> RecipeGrid {
    Default::default()
}

/// A fixed-shape station recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Globally unique id, conventionally `<type>/<name>`.
    pub id: String,
    /// Normalized station type the recipe belongs to.
    pub station_type: String,
    /// Expected inputs.
    pub grid: RecipeGrid,
    /// Produced item.
    pub result: Option<ItemValue>,
}

impl Recipe {
    /// Assemble a recipe from its parts.
    pub fn new(
        id: impl Into<String>,
        station_type: impl Into<String>,
        grid: RecipeGrid,
        result: Option<ItemValue>,
    ) -> Self {
        Self {
            id: id.into(),
            station_type: station_type.into(),
            grid,
            result,
        }
    }

    /// Build a recipe from a persisted slot array (grid first, result last).
    ///
    /// Short arrays leave the missing slots empty; extra slots are ignored.
    pub fn from_slots(
        id: impl Into<String>,
        station_type: impl Into<String>,
        slots: Vec<Option<ItemValue>>,
    ) -> Self {
        let mut grid = empty_grid();
        let mut result = None;
        for (index, slot) in slots.into_iter().enumerate() {
            match index {
                i if i < GRID_SIZE => grid[i] = slot,
                RESULT_INDEX => result = slot,
                _ => break,
            }
        }
        Self::new(id, station_type, grid, result)
    }

    /// The persisted slot array: 9 grid slots followed by the result.
    pub fn to_slots(&self) -> Vec<Option<ItemValue>> {
        let mut slots = Vec::with_capacity(ENCODED_SLOTS);
        slots.extend(self.grid.iter().cloned());
        slots.push(self.result.clone());
        slots
    }

    /// Whether this record is a station's reserved head-item record.
    pub fn is_head_record(&self) -> bool {
        station::is_head_record(&self.id)
    }

    /// True when `actual` satisfies this recipe's grid.
    ///
    /// Both empty: fine. Exactly one empty: no match. Both present: same
    /// material and at least the expected amount.
    pub fn accepts(&self, actual: &[Option<ItemValue>]) -> bool {
        if actual.len() != GRID_SIZE {
            return false;
        }
        self.grid
            .iter()
            .zip(actual)
            .all(|(expected, actual)| slot_accepts(expected.as_ref(), actual.as_ref()))
    }

    /// True when some grid would satisfy both recipes, making the later one unreachable
    /// for that grid.
    pub fn overlaps(&self, other: &Recipe) -> bool {
        self.grid.iter().zip(other.grid.iter()).all(|(a, b)| {
            match (slot_is_empty(a.as_ref()), slot_is_empty(b.as_ref())) {
                (true, true) => true,
                (false, false) => match (a, b) {
                    (Some(a), Some(b)) => a.same_identity(b),
                    _ => false,
                },
                _ => false,
            }
        })
    }
}

fn slot_accepts(expected: Option<&ItemValue>, actual: Option<&ItemValue>) -> bool {
    match (slot_is_empty(expected), slot_is_empty(actual)) {
        (true, true) => true,
        (false, false) => match (expected, actual) {
            (Some(expected), Some(actual)) => {
                expected.same_identity(actual) && actual.amount >= expected.amount
            }
            _ => false,
        },
        _ => false,
    }
}

/// A registered crafting context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationType {
    /// Normalized (lowercased) name.
    pub name: String,
    /// Encoded head item.
    pub head_item: String,
}
