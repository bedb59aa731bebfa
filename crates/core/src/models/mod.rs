//! Shared domain models.

mod item;
mod recipe;

pub use item::{ItemMeta, ItemValue, AIR, DEFAULT_MAX_STACK, STATION_TAG_KEY};
pub use recipe::{
    empty_grid, Recipe, RecipeGrid, StationType, ENCODED_SLOTS, GRID_SIZE, RESULT_INDEX,
};
