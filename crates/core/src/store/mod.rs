//! Durable storage for recipes and station types.
//!
//! The provider only ever talks to [`PersistentStore`]; calls are blocking
//! and are run on the provider's worker pool, never on the interaction loop.

mod file;
mod memory;
mod tables;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be read or written.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A station type with this name already exists.
    #[error("station type '{0}' already exists")]
    DuplicateType(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Backend is unreachable or refused the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One persisted recipe: grid and result encoded as a 10-slot array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRow {
    /// Recipe id.
    #[serde(default)]
    pub id: String,
    /// Station type.
    #[serde(rename = "type", default)]
    pub station_type: String,
    /// Encoded slot array.
    #[serde(default)]
    pub contents: Option<String>,
    /// First insert.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last write.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One persisted station type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRow {
    /// Station type name.
    #[serde(rename = "type", default)]
    pub station_type: String,
    /// Encoded head item.
    #[serde(default)]
    pub head_item: Option<String>,
    /// Registration time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Blocking storage backend for recipes and station types.
///
/// Recipe listings are ordered by last write, oldest first, so rebuilding
/// the cache from them reproduces live registration order.
pub trait PersistentStore: Send + Sync {
    /// Create tables / files if they do not exist.
    fn create_schema(&self) -> StoreResult<()>;
    /// Insert or replace a recipe.
    fn upsert_recipe(&self, id: &str, station_type: &str, contents: &str) -> StoreResult<()>;
    /// Fetch a recipe by id.
    fn recipe(&self, id: &str) -> StoreResult<Option<RecipeRow>>;
    /// All recipes of one type.
    fn recipes_by_type(&self, station_type: &str) -> StoreResult<Vec<RecipeRow>>;
    /// Every recipe.
    fn all_recipes(&self) -> StoreResult<Vec<RecipeRow>>;
    /// Delete a recipe; deleting a missing id succeeds.
    fn delete_recipe(&self, id: &str) -> StoreResult<()>;
    /// Register a station type. Fails with [`StoreError::DuplicateType`] if present.
    fn insert_type(&self, station_type: &str, head_item: &str) -> StoreResult<()>;
    /// Whether a station type is registered.
    fn type_exists(&self, station_type: &str) -> StoreResult<bool>;
    /// Encoded head item of a station type.
    fn type_head_item(&self, station_type: &str) -> StoreResult<Option<String>>;
    /// Registered type names.
    fn all_types(&self) -> StoreResult<Vec<String>>;
    /// Registered types with their head items.
    fn all_types_with_head_items(&self) -> StoreResult<Vec<TypeRow>>;
    /// Re-read backing state that may have changed outside this process.
    fn refresh(&self) -> StoreResult<()> {
        Ok(())
    }
    /// Release the backend. Later calls fail with [`StoreError::Closed`].
    fn close(&self);
}
