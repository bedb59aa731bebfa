#![warn(clippy::all, missing_docs)]

//! Core of the station crafting service.
//!
//! This crate hosts the item codec, the recipe cache and its matching
//! rules, the asynchronous store provider that keeps the cache in step with
//! durable storage, and the interaction state machine that drives station
//! surfaces from a single-threaded loop.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod interaction;
pub mod models;
pub mod provider;
pub mod station;
pub mod store;
pub mod watch;

pub use cache::{CacheStats, RecipeCache, RecipeList};
pub use config::AppConfig;
pub use error::{CraftError, Result, ValidationError};
pub use interaction::{
    ClickKind, Decision, HeadlessPlayer, InteractionLoop, InteractionMachine, Notice, Player,
    PlayerId, SurfaceId, SurfaceMode,
};
pub use models::{ItemValue, Recipe, RecipeGrid, StationType};
pub use provider::{Pending, SyncProvider};
pub use store::{JsonFileStore, MemoryStore, PersistentStore, StoreError};
pub use watch::StoreWatcher;
