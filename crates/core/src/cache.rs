//! Process-wide recipe and station type cache, and the grid matcher.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    codec,
    models::{ItemValue, Recipe},
    station,
    store::{RecipeRow, TypeRow},
};

/// Immutable snapshot of one type's recipes in registration order.
pub type RecipeList = Arc<Vec<Arc<Recipe>>>;

/// Thread-safe in-memory mirror of the recipe and station type tables.
///
/// Buckets are copy-on-write: readers clone the bucket `Arc` under a short
/// read lock and iterate without holding it, writers build a new bucket and
/// swap it in. No lock is ever held across store I/O.
#[derive(Default)]
pub struct RecipeCache {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    recipes_by_type: HashMap<String, RecipeList>,
    head_items: HashMap<String, String>,
}

/// Outcome of a full population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Recipes now cached.
    pub recipes: usize,
    /// Station types now cached.
    pub types: usize,
    /// Rows ignored because they were incomplete or undecodable.
    pub skipped: usize,
}

impl RecipeCache {
    /// Empty cache; every lookup reports "no recipes" until populated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with the given store rows.
    ///
    /// Incomplete or undecodable rows are skipped. Calling this again with
    /// the same rows yields the same state.
    pub fn load_all(&self, recipes: &[RecipeRow], types: &[TypeRow]) -> CacheStats {
        let mut stats = CacheStats::default();
        let mut head_items = HashMap::new();
        for row in types {
            let station_type = station::normalize_type(&row.station_type);
            match row.head_item.as_deref() {
                Some(head) if !station_type.is_empty() && !head.is_empty() => {
                    head_items.insert(station_type, head.to_string());
                }
                _ => {
                    warn!(station_type = %row.station_type, "Skipping incomplete type row");
                    stats.skipped += 1;
                }
            }
        }

        let mut buckets: HashMap<String, Vec<Arc<Recipe>>> = HashMap::new();
        let mut owners: HashMap<String, String> = HashMap::new();
        for row in recipes {
            let station_type = station::normalize_type(&row.station_type);
            let contents = match row.contents.as_deref() {
                Some(contents) if !row.id.is_empty() && !station_type.is_empty() => contents,
                _ => {
                    warn!(recipe_id = %row.id, "Skipping incomplete recipe row");
                    stats.skipped += 1;
                    continue;
                }
            };

            if station::is_head_record(&row.id) {
                // Older head records hold a single encoded item.
                if codec::decode(contents).is_some() {
                    head_items
                        .entry(station_type)
                        .or_insert_with(|| contents.to_string());
                } else {
                    stats.skipped += 1;
                }
                continue;
            }

            let Some(slots) = codec::decode_array(contents) else {
                warn!(recipe_id = %row.id, "Skipping recipe with undecodable contents");
                stats.skipped += 1;
                continue;
            };
            // Ids are unique across types; the last row wins.
            if let Some(previous) = owners.insert(row.id.clone(), station_type.clone()) {
                if let Some(bucket) = buckets.get_mut(&previous) {
                    bucket.retain(|existing| existing.id != row.id);
                }
            }
            buckets
                .entry(station_type.clone())
                .or_default()
                .push(Arc::new(Recipe::from_slots(row.id.clone(), station_type, slots)));
        }

        let recipes_by_type: HashMap<String, RecipeList> = buckets
            .into_iter()
            .map(|(station_type, list)| (station_type, Arc::new(list)))
            .collect();
        stats.recipes = recipes_by_type.values().map(|list| list.len()).sum();
        stats.types = head_items.len();

        let mut inner = self.inner.write();
        inner.recipes_by_type = recipes_by_type;
        inner.head_items = head_items;
        drop(inner);

        info!(
            recipes = stats.recipes,
            types = stats.types,
            skipped = stats.skipped,
            "Recipe cache populated"
        );
        stats
    }

    /// Insert or replace a recipe, appending it to its type's bucket.
    ///
    /// Any entry with the same id is removed from every bucket first so a
    /// type change leaves nothing behind under the old type.
    pub fn put_recipe(&self, recipe: Recipe) {
        if recipe.is_head_record() {
            debug!(recipe_id = %recipe.id, "Head records are not cached as recipes");
            return;
        }
        let mut inner = self.inner.write();
        remove_from_buckets(&mut inner.recipes_by_type, &recipe.id);
        let bucket = inner
            .recipes_by_type
            .entry(recipe.station_type.clone())
            .or_default();
        let mut next = Vec::with_capacity(bucket.len() + 1);
        next.extend(bucket.iter().cloned());
        next.push(Arc::new(recipe));
        *bucket = Arc::new(next);
    }

    /// Remove a recipe by id. Returns whether anything was removed.
    pub fn remove_recipe(&self, id: &str) -> bool {
        remove_from_buckets(&mut self.inner.write().recipes_by_type, id)
    }

    /// Register or replace a station type's encoded head item.
    pub fn put_type(&self, station_type: impl Into<String>, head_item: impl Into<String>) {
        self.inner
            .write()
            .head_items
            .insert(station_type.into(), head_item.into());
    }

    /// Whether the station type is registered.
    pub fn type_exists(&self, station_type: &str) -> bool {
        self.inner.read().head_items.contains_key(station_type)
    }

    /// Encoded head item of a station type.
    pub fn head_item(&self, station_type: &str) -> Option<String> {
        self.inner.read().head_items.get(station_type).cloned()
    }

    /// All registered station types.
    pub fn types(&self) -> BTreeSet<String> {
        self.inner.read().head_items.keys().cloned().collect()
    }

    /// Recipes of a type, oldest first. Empty for unknown types.
    pub fn recipes(&self, station_type: &str) -> RecipeList {
        self.inner
            .read()
            .recipes_by_type
            .get(station_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Look a recipe up by id across every type.
    pub fn recipe(&self, id: &str) -> Option<Arc<Recipe>> {
        let inner = self.inner.read();
        let found = inner
            .recipes_by_type
            .values()
            .flat_map(|list| list.iter())
            .find(|recipe| recipe.id == id)
            .cloned();
        found
    }

    /// First recipe of `station_type`, in registration order, whose grid is
    /// satisfied by `grid`. Grids that are not exactly 9 slots never match.
    pub fn match_recipe(&self, station_type: &str, grid: &[Option<ItemValue>]) -> Option<Arc<Recipe>> {
        self.recipes(station_type)
            .iter()
            .find(|recipe| recipe.accepts(grid))
            .cloned()
    }

    /// Cached recipes that would win over `recipe` once it is (re)registered,
    /// since a save always moves it to the end of its bucket.
    pub fn shadowing(&self, recipe: &Recipe) -> Vec<String> {
        self.recipes(&recipe.station_type)
            .iter()
            .filter(|existing| existing.id != recipe.id && existing.overlaps(recipe))
            .map(|existing| existing.id.clone())
            .collect()
    }
}

fn remove_from_buckets(buckets: &mut HashMap<String, RecipeList>, id: &str) -> bool {
    let mut removed = false;
    for bucket in buckets.values_mut() {
        if bucket.iter().any(|recipe| recipe.id == id) {
            let next: Vec<_> = bucket.iter().filter(|recipe| recipe.id != id).cloned().collect();
            *bucket = Arc::new(next);
            removed = true;
        }
    }
    removed
}
