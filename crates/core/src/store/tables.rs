use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{RecipeRow, StoreError, StoreResult, TypeRow};

/// Row storage shared by the in-memory and file stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    pub(crate) recipes: Vec<RecipeRow>,
    #[serde(default)]
    pub(crate) types: Vec<TypeRow>,
}

impl Tables {
    pub(crate) fn upsert_recipe(&mut self, id: &str, station_type: &str, contents: &str) {
        let now = Utc::now();
        let created_at = match self.recipes.iter().position(|row| row.id == id) {
            Some(index) => self.recipes.remove(index).created_at,
            None => Some(now),
        };
        self.recipes.push(RecipeRow {
            id: id.to_string(),
            station_type: station_type.to_string(),
            contents: Some(contents.to_string()),
            created_at,
            updated_at: Some(now),
        });
    }

    pub(crate) fn recipe(&self, id: &str) -> Option<RecipeRow> {
        self.recipes.iter().find(|row| row.id == id).cloned()
    }

    pub(crate) fn recipes_by_type(&self, station_type: &str) -> Vec<RecipeRow> {
        self.recipes
            .iter()
            .filter(|row| row.station_type == station_type)
            .cloned()
            .collect()
    }

    pub(crate) fn delete_recipe(&mut self, id: &str) -> bool {
        let before = self.recipes.len();
        self.recipes.retain(|row| row.id != id);
        self.recipes.len() != before
    }

    pub(crate) fn insert_type(&mut self, station_type: &str, head_item: &str) -> StoreResult<()> {
        if self.type_row(station_type).is_some() {
            return Err(StoreError::DuplicateType(station_type.to_string()));
        }
        self.types.push(TypeRow {
            station_type: station_type.to_string(),
            head_item: Some(head_item.to_string()),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    pub(crate) fn type_row(&self, station_type: &str) -> Option<&TypeRow> {
        self.types.iter().find(|row| row.station_type == station_type)
    }

    pub(crate) fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|row| row.station_type.clone()).collect()
    }
}
