use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{tables::Tables, PersistentStore, RecipeRow, StoreError, StoreResult, TypeRow};

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        f(&mut self.tables.lock())
    }
}

impl PersistentStore for MemoryStore {
    fn create_schema(&self) -> StoreResult<()> {
        self.with(|_| Ok(()))
    }

    fn upsert_recipe(&self, id: &str, station_type: &str, contents: &str) -> StoreResult<()> {
        self.with(|tables| {
            tables.upsert_recipe(id, station_type, contents);
            Ok(())
        })
    }

    fn recipe(&self, id: &str) -> StoreResult<Option<RecipeRow>> {
        self.with(|tables| Ok(tables.recipe(id)))
    }

    fn recipes_by_type(&self, station_type: &str) -> StoreResult<Vec<RecipeRow>> {
        self.with(|tables| Ok(tables.recipes_by_type(station_type)))
    }

    fn all_recipes(&self) -> StoreResult<Vec<RecipeRow>> {
        self.with(|tables| Ok(tables.recipes.clone()))
    }

    fn delete_recipe(&self, id: &str) -> StoreResult<()> {
        self.with(|tables| {
            tables.delete_recipe(id);
            Ok(())
        })
    }

    fn insert_type(&self, station_type: &str, head_item: &str) -> StoreResult<()> {
        self.with(|tables| tables.insert_type(station_type, head_item))
    }

    fn type_exists(&self, station_type: &str) -> StoreResult<bool> {
        self.with(|tables| Ok(tables.type_row(station_type).is_some()))
    }

    fn type_head_item(&self, station_type: &str) -> StoreResult<Option<String>> {
        self.with(|tables| {
            Ok(tables
                .type_row(station_type)
                .and_then(|row| row.head_item.clone()))
        })
    }

    fn all_types(&self) -> StoreResult<Vec<String>> {
        self.with(|tables| Ok(tables.type_names()))
    }

    fn all_types_with_head_items(&self) -> StoreResult<Vec<TypeRow>> {
        self.with(|tables| Ok(tables.types.clone()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_fail_after_close() {
        let store = MemoryStore::new();
        store.upsert_recipe("t/a", "t", "x").expect("upsert");
        store.close();
        store.close();
        assert!(matches!(store.all_recipes(), Err(StoreError::Closed)));
    }

    #[test]
    fn recipes_are_filtered_by_type() {
        let store = MemoryStore::new();
        store.upsert_recipe("t/a", "t", "x").expect("upsert");
        store.upsert_recipe("u/a", "u", "y").expect("upsert");
        let rows = store.recipes_by_type("u").expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "u/a");
        store.delete_recipe("missing").expect("delete is idempotent");
    }
}
