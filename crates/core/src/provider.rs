//! Asynchronous façade over the durable store.
//!
//! Every store call runs on a bounded blocking pool. A successful mutation is
//! followed by the matching cache patch inside the same task; a failed one
//! leaves the cache untouched.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    runtime::Handle,
    sync::Semaphore,
    task::{self, JoinHandle},
};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheStats, RecipeCache},
    codec,
    error::{CraftError, Result, ValidationError},
    models::{ItemValue, Recipe, StationType},
    station,
    store::{PersistentStore, RecipeRow},
};

/// Handle to a persistence call already running on the worker pool.
///
/// Dropping it does not cancel the call or its cache patch.
#[must_use = "await the handle to observe the outcome"]
pub struct Pending<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => Poll::Ready(Err(CraftError::Worker(err.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Keeps [`RecipeCache`] in step with a [`PersistentStore`].
#[derive(Clone)]
pub struct SyncProvider {
    store: Arc<dyn PersistentStore>,
    cache: Arc<RecipeCache>,
    permits: Arc<Semaphore>,
    workers: u32,
    runtime: Handle,
}

impl SyncProvider {
    /// Wrap `store`, patching `cache`, with at most `workers` calls in flight.
    pub fn new(
        store: Arc<dyn PersistentStore>,
        cache: Arc<RecipeCache>,
        workers: usize,
        runtime: Handle,
    ) -> Self {
        let workers = workers.clamp(1, 1024) as u32;
        Self {
            store,
            cache,
            permits: Arc::new(Semaphore::new(workers as usize)),
            workers,
            runtime,
        }
    }

    /// Shared cache patched by this provider.
    pub fn cache(&self) -> &Arc<RecipeCache> {
        &self.cache
    }

    /// Runtime the worker tasks are spawned on.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn dispatch<T, F>(&self, operation: &'static str, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PersistentStore, &RecipeCache) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let permits = Arc::clone(&self.permits);
        let handle = self.runtime.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CraftError::Worker(format!("{operation}: provider is shut down")))?;
            let result = task::spawn_blocking(move || f(store.as_ref(), cache.as_ref()))
                .await
                .map_err(|err| CraftError::Worker(format!("{operation}: {err}")))?;
            if let Err(err) = &result {
                warn!(operation, error = %err, "Provider call failed");
            }
            result
        });
        Pending { handle }
    }

    /// Read every recipe and type and rebuild the cache once.
    pub fn populate(&self) -> Pending<CacheStats> {
        self.dispatch("populate", |store, cache| {
            let recipes = store.all_recipes()?;
            let types = store.all_types_with_head_items()?;
            Ok(cache.load_all(&recipes, &types))
        })
    }

    /// Re-read externally changed store state, then rebuild the cache.
    pub fn resync(&self) -> Pending<CacheStats> {
        self.dispatch("resync", |store, cache| {
            store.refresh()?;
            let recipes = store.all_recipes()?;
            let types = store.all_types_with_head_items()?;
            info!("Resyncing recipe cache from store");
            Ok(cache.load_all(&recipes, &types))
        })
    }

    /// Persist `recipe` (replacing any record with its id), then cache it.
    pub fn save_recipe(&self, recipe: Recipe) -> Pending<()> {
        self.dispatch("save_recipe", move |store, cache| {
            let mut recipe = recipe;
            recipe.station_type = station::normalize_type(&recipe.station_type);
            if recipe.is_head_record() {
                return Err(ValidationError::ReservedId(recipe.id).into());
            }
            if !cache.type_exists(&recipe.station_type) && !store.type_exists(&recipe.station_type)? {
                return Err(ValidationError::UnknownType(recipe.station_type).into());
            }

            let contents = codec::try_encode_array(&recipe.to_slots())?;
            let shadowed_by = cache.shadowing(&recipe);
            if !shadowed_by.is_empty() {
                warn!(
                    recipe_id = %recipe.id,
                    station_type = %recipe.station_type,
                    ?shadowed_by,
                    "Recipe overlaps earlier recipes and will only match when they do not"
                );
            }

            store.upsert_recipe(&recipe.id, &recipe.station_type, &contents)?;
            debug!(recipe_id = %recipe.id, station_type = %recipe.station_type, "Recipe saved");
            cache.put_recipe(recipe);
            Ok(())
        })
    }

    /// Fetch one recipe from the store of record.
    pub fn recipe(&self, id: impl Into<String>) -> Pending<Option<Recipe>> {
        let id = id.into();
        self.dispatch("recipe", move |store, _| {
            Ok(store.recipe(&id)?.and_then(decode_row))
        })
    }

    /// Fetch a type's recipes from the store of record, head records excluded.
    pub fn recipes_by_type(&self, station_type: &str) -> Pending<Vec<Recipe>> {
        let station_type = station::normalize_type(station_type);
        self.dispatch("recipes_by_type", move |store, _| {
            Ok(store
                .recipes_by_type(&station_type)?
                .into_iter()
                .filter_map(decode_row)
                .collect())
        })
    }

    /// Delete a recipe, then drop it from the cache.
    pub fn delete_recipe(&self, id: impl Into<String>) -> Pending<()> {
        let id = id.into();
        self.dispatch("delete_recipe", move |store, cache| {
            store.delete_recipe(&id)?;
            if cache.remove_recipe(&id) {
                debug!(recipe_id = %id, "Recipe deleted");
            }
            Ok(())
        })
    }

    /// Insert a type with an already encoded head item.
    ///
    /// A duplicate surfaces as the store's constraint violation.
    pub fn insert_type(&self, station_type: &str, head_item: impl Into<String>) -> Pending<()> {
        let requested = station_type.to_string();
        let head_item = head_item.into();
        self.dispatch("insert_type", move |store, cache| {
            let station_type = station::validate_type_name(&requested)?;
            store.insert_type(&station_type, &head_item)?;
            cache.put_type(station_type, head_item);
            Ok(())
        })
    }

    /// Validate, encode and register a new station type.
    pub fn register_type(&self, station_type: &str, head_item: &ItemValue) -> Pending<StationType> {
        let requested = station_type.to_string();
        let head_item = head_item.clone();
        self.dispatch("register_type", move |store, cache| {
            let name = station::validate_type_name(&requested)?;
            let encoded = codec::encode(&head_item).ok_or_else(|| {
                codec::CodecError::Encode(format!("head item of '{name}'"))
            })?;
            if store.type_exists(&name)? {
                return Err(ValidationError::DuplicateType(name).into());
            }
            store.insert_type(&name, &encoded)?;
            cache.put_type(name.clone(), encoded.clone());
            info!(station_type = %name, "Station type registered");
            Ok(StationType {
                name,
                head_item: encoded,
            })
        })
    }

    /// Whether the store knows `station_type`.
    pub fn type_exists(&self, station_type: &str) -> Pending<bool> {
        let station_type = station::normalize_type(station_type);
        self.dispatch("type_exists", move |store, _| Ok(store.type_exists(&station_type)?))
    }

    /// Encoded head item of `station_type` from the store.
    pub fn type_head_item(&self, station_type: &str) -> Pending<Option<String>> {
        let station_type = station::normalize_type(station_type);
        self.dispatch("type_head_item", move |store, _| {
            Ok(store.type_head_item(&station_type)?)
        })
    }

    /// All type names from the store.
    pub fn all_types(&self) -> Pending<Vec<String>> {
        self.dispatch("all_types", |store, _| Ok(store.all_types()?))
    }

    /// Wait for in-flight calls, refuse new ones and close the store.
    ///
    /// The cache is left as is and goes away with its last owner.
    pub async fn shutdown(&self) {
        match self.permits.acquire_many(self.workers).await {
            Ok(_drained) => self.permits.close(),
            Err(_) => return,
        }
        let store = Arc::clone(&self.store);
        if let Err(err) = task::spawn_blocking(move || store.close()).await {
            warn!(?err, "Closing the store panicked");
            return;
        }
        info!("Recipe store closed");
    }
}

fn decode_row(row: RecipeRow) -> Option<Recipe> {
    if station::is_head_record(&row.id) {
        return None;
    }
    let slots = codec::decode_array(row.contents.as_deref()?)?;
    Some(Recipe::from_slots(row.id, station::normalize_type(&row.station_type), slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::empty_grid,
        store::{MemoryStore, StoreError, StoreResult, TypeRow},
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl PersistentStore for FlakyStore {
        fn create_schema(&self) -> StoreResult<()> {
            self.inner.create_schema()
        }
        fn upsert_recipe(&self, id: &str, station_type: &str, contents: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.upsert_recipe(id, station_type, contents)
        }
        fn recipe(&self, id: &str) -> StoreResult<Option<RecipeRow>> {
            self.inner.recipe(id)
        }
        fn recipes_by_type(&self, station_type: &str) -> StoreResult<Vec<RecipeRow>> {
            self.inner.recipes_by_type(station_type)
        }
        fn all_recipes(&self) -> StoreResult<Vec<RecipeRow>> {
            self.inner.all_recipes()
        }
        fn delete_recipe(&self, id: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.delete_recipe(id)
        }
        fn insert_type(&self, station_type: &str, head_item: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.insert_type(station_type, head_item)
        }
        fn type_exists(&self, station_type: &str) -> StoreResult<bool> {
            self.inner.type_exists(station_type)
        }
        fn type_head_item(&self, station_type: &str) -> StoreResult<Option<String>> {
            self.inner.type_head_item(station_type)
        }
        fn all_types(&self) -> StoreResult<Vec<String>> {
            self.inner.all_types()
        }
        fn all_types_with_head_items(&self) -> StoreResult<Vec<TypeRow>> {
            self.inner.all_types_with_head_items()
        }
        fn close(&self) {
            self.inner.close()
        }
    }

    fn provider(store: Arc<dyn PersistentStore>) -> SyncProvider {
        SyncProvider::new(store, Arc::new(RecipeCache::new()), 2, Handle::current())
    }

    async fn register(provider: &SyncProvider, names: &[&str]) -> anyhow::Result<()> {
        for name in names {
            provider.register_type(name, &ItemValue::new("player_head", 1)).await?;
        }
        Ok(())
    }

    fn sword_recipe(id: &str, station_type: &str) -> Recipe {
        let mut grid = empty_grid();
        grid[0] = Some(ItemValue::new("iron_ingot", 1));
        Recipe::new(id, station_type, grid, Some(ItemValue::new("iron_sword", 1)))
    }

    #[tokio::test]
    async fn save_and_delete_patch_the_cache() -> anyhow::Result<()> {
        let provider = provider(Arc::new(MemoryStore::new()));
        register(&provider, &["t"]).await?;
        provider.save_recipe(sword_recipe("t/a", "T")).await?;

        let cached = provider.cache().recipes("t");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, "t/a");
        assert_eq!(provider.recipe("t/a").await?, Some(sword_recipe("t/a", "t")));

        provider.delete_recipe("t/a").await?;
        assert!(provider.cache().recipes("t").is_empty());
        assert_eq!(provider.recipe("t/a").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_alone() -> anyhow::Result<()> {
        let store = Arc::new(FlakyStore::default());
        let provider = provider(store.clone());
        register(&provider, &["t", "u"]).await?;
        provider.save_recipe(sword_recipe("t/a", "t")).await?;

        store.failing.store(true, Ordering::SeqCst);
        let mut changed = sword_recipe("t/a", "u");
        changed.result = None;
        let err = provider.save_recipe(changed).await.unwrap_err();
        assert!(matches!(err, CraftError::Persistence(StoreError::Unavailable(_))));
        assert!(provider.delete_recipe("t/a").await.is_err());

        let cached = provider.cache().recipes("t");
        assert_eq!(cached.len(), 1);
        assert!(cached[0].result.is_some());
        assert!(provider.cache().recipes("u").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn populate_rebuilds_from_store() -> anyhow::Result<()> {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let writer = provider(store.clone());
        writer.register_type("Anvil", &ItemValue::new("anvil", 1)).await?;
        writer.save_recipe(sword_recipe("anvil/a", "anvil")).await?;
        writer.save_recipe(sword_recipe("anvil/b", "anvil")).await?;

        let reader = provider(store);
        let stats = reader.populate().await?;
        assert_eq!(stats, CacheStats { recipes: 2, types: 1, skipped: 0 });
        let ids: Vec<_> = reader.cache().recipes("anvil").iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["anvil/a", "anvil/b"]);
        assert!(reader.cache().type_exists("anvil"));
        Ok(())
    }

    #[tokio::test]
    async fn register_type_rejects_duplicates_and_bad_names() -> anyhow::Result<()> {
        let provider = provider(Arc::new(MemoryStore::new()));
        let station = provider.register_type("Anvil", &ItemValue::new("anvil", 1)).await?;
        assert_eq!(station.name, "anvil");
        assert_eq!(provider.type_head_item("ANVIL").await?, Some(station.head_item));

        let err = provider
            .register_type("anvil", &ItemValue::new("anvil", 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CraftError::Validation(ValidationError::DuplicateType(_))
        ));

        let err = provider
            .register_type("no/slash", &ItemValue::new("anvil", 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CraftError::Validation(ValidationError::InvalidTypeName(_))
        ));

        let err = provider.insert_type("anvil", "HEAD").await.unwrap_err();
        assert!(matches!(err, CraftError::Persistence(StoreError::DuplicateType(_))));
        let err = provider.insert_type("no/slash", "HEAD").await.unwrap_err();
        assert!(matches!(
            err,
            CraftError::Validation(ValidationError::InvalidTypeName(_))
        ));
        assert_eq!(provider.all_types().await?, vec!["anvil".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn head_record_ids_are_reserved() {
        let provider = provider(Arc::new(MemoryStore::new()));
        let err = provider
            .save_recipe(sword_recipe("anvil/__head__", "anvil"))
            .await
            .unwrap_err();
        assert!(matches!(err, CraftError::Validation(ValidationError::ReservedId(_))));
    }

    #[tokio::test]
    async fn recipes_need_a_registered_type() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(store.clone());
        let err = provider.save_recipe(sword_recipe("forge/x", "forge")).await.unwrap_err();
        assert!(matches!(err, CraftError::Validation(ValidationError::UnknownType(_))));
        assert!(store.all_recipes()?.is_empty());
        assert!(provider.cache().recipes("forge").is_empty());

        // A type the store knows but the cache has not loaded yet is accepted.
        store.insert_type("forge", "HEAD")?;
        provider.save_recipe(sword_recipe("forge/x", "Forge")).await?;
        assert_eq!(provider.cache().recipes("forge").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_handle_still_completes() -> anyhow::Result<()> {
        let provider = provider(Arc::new(MemoryStore::new()));
        register(&provider, &["t"]).await?;
        drop(provider.save_recipe(sword_recipe("t/a", "t")));
        // Yields, so the detached save takes its permit first.
        provider.all_types().await?;
        provider.shutdown().await;
        assert_eq!(provider.cache().recipes("t").len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn calls_after_shutdown_fail_fast() {
        let provider = provider(Arc::new(MemoryStore::new()));
        provider.shutdown().await;
        provider.shutdown().await;
        let err = provider.all_types().await.unwrap_err();
        assert!(matches!(err, CraftError::Worker(_)));
    }
}
