//! Headless host: owns the store, the provider and the interaction loop.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use stationcraft_core::{
    store::{JsonFileStore, PersistentStore},
    AppConfig, HeadlessPlayer, InteractionLoop, RecipeCache, StoreWatcher, SyncProvider,
};
use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

/// Run until Ctrl-C, then close the store.
pub async fn run(config: AppConfig) -> Result<()> {
    let store_path = config.store_path();
    let store = JsonFileStore::open(&store_path)
        .with_context(|| format!("failed to open recipe store {}", store_path.display()))?;
    store.create_schema().context("failed to create recipe store")?;

    let cache = Arc::new(RecipeCache::new());
    let provider = SyncProvider::new(
        Arc::new(store),
        cache,
        config.worker_threads,
        Handle::current(),
    );
    let stats = provider
        .populate()
        .await
        .context("initial recipe cache population failed")?;
    info!(
        recipes = stats.recipes,
        types = stats.types,
        skipped = stats.skipped,
        "Recipe store loaded"
    );

    let mut interaction: InteractionLoop<HeadlessPlayer> =
        InteractionLoop::new(provider.clone(), &config.default_type);

    let (_watcher, mut resync_rx) = if config.watch_store {
        match StoreWatcher::spawn(&store_path) {
            Ok((watcher, rx)) => (Some(watcher), Some(rx)),
            Err(err) => {
                warn!(?err, "Store watcher unavailable; external edits need a restart");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let mut ticker = time::interval(Duration::from_millis(config.tick_rate_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                interaction.tick();
            }
            Some(()) = next_resync(&mut resync_rx) => {
                info!("Store changed on disk; resyncing");
                interaction.handle().after(provider.runtime(), provider.resync(), |_, outcome| {
                    match outcome {
                        Ok(stats) => info!(recipes = stats.recipes, types = stats.types, "Resync finished"),
                        Err(err) => warn!(error = %err, "Resync failed; keeping previous cache"),
                    }
                });
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    // Let completions already queued reach their players.
    interaction.tick();
    provider.shutdown().await;
    Ok(())
}

async fn next_resync(rx: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
