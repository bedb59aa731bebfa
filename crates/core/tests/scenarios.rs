//! End-to-end station scenarios driven through the interaction loop.

use std::{sync::Arc, time::Duration};

use stationcraft_core::{
    interaction::layout::{INPUT_SLOTS, RESULT_SLOT},
    models::{empty_grid, ItemValue, Recipe},
    station,
    store::{JsonFileStore, MemoryStore, PersistentStore},
    ClickKind, CraftError, Decision, HeadlessPlayer, InteractionLoop, Notice, Player, PlayerId,
    RecipeCache, SyncProvider, ValidationError,
};
use tokio::{runtime::Handle, time::timeout};

const ALEX: PlayerId = PlayerId(7);

fn item(material: &str, amount: u32) -> Option<ItemValue> {
    Some(ItemValue::new(material, amount))
}

fn provider_over(store: Arc<dyn PersistentStore>) -> SyncProvider {
    SyncProvider::new(store, Arc::new(RecipeCache::new()), 2, Handle::current())
}

async fn anvil_world(provider: &SyncProvider) -> anyhow::Result<()> {
    provider
        .register_type("Anvil", &ItemValue::new("anvil", 1).named("H"))
        .await?;
    let mut grid = empty_grid();
    grid[0] = item("iron_ingot", 1);
    grid[1] = item("iron_ingot", 1);
    grid[4] = item("stick", 1);
    provider
        .save_recipe(Recipe::new(
            station::recipe_id("anvil", "sword"),
            "anvil",
            grid,
            item("iron_sword", 1),
        ))
        .await?;
    Ok(())
}

fn fill(interaction: &mut InteractionLoop<HeadlessPlayer>, surface: u64, slots: &[(usize, &str, u32)]) {
    let machine = interaction.machine_mut();
    for (index, material, amount) in slots {
        if let Some(player) = machine.player_mut(ALEX) {
            *player.inventory_mut().cursor_mut() = item(material, *amount);
        }
        let decision = machine
            .click(surface, INPUT_SLOTS[*index], ClickKind::Place)
            .expect("surface is open");
        assert_eq!(decision, Decision::Allow);
    }
}

#[tokio::test]
async fn anvil_sword_is_crafted_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store_path = dir.path().join("stationcraft.json");
    {
        let writer = provider_over(Arc::new(JsonFileStore::open(&store_path)?));
        anvil_world(&writer).await?;
        writer.shutdown().await;
    }

    // Fresh process: everything comes back from disk.
    let provider = provider_over(Arc::new(JsonFileStore::open(&store_path)?));
    let stats = provider.populate().await?;
    assert_eq!((stats.recipes, stats.types), (1, 1));

    let mut interaction = InteractionLoop::new(provider.clone(), "default");
    let mut alex = HeadlessPlayer::new(ALEX.0);
    let token = station::issue_token(provider.cache(), "anvil")?;
    assert_eq!(token.meta.display_name.as_deref(), Some("H"));
    alex.inventory_mut().set_slot(0, Some(token));
    interaction.machine_mut().join(alex);

    let surface = interaction.machine_mut().open_crafting_view(ALEX, "anvil")?;

    // Slot 1 left empty: no match.
    fill(&mut interaction, surface, &[(0, "iron_ingot", 1), (4, "stick", 1)]);
    interaction.tick();
    assert_eq!(interaction.machine().surface(surface).and_then(|s| s.result().cloned()), None);

    fill(&mut interaction, surface, &[(1, "iron_ingot", 1)]);
    interaction.tick();
    assert_eq!(
        interaction.machine().surface(surface).and_then(|s| s.result().cloned()),
        item("iron_sword", 1)
    );

    let decision = interaction.machine_mut().click(surface, RESULT_SLOT, ClickKind::Pickup)?;
    assert_eq!(decision, Decision::Cancel);

    let machine = interaction.machine();
    let open = machine.surface(surface).expect("still open");
    assert!(open.inputs().iter().all(Option::is_none));
    assert_eq!(open.result(), None);
    let alex = machine.player(ALEX).expect("connected");
    assert_eq!(alex.inventory().cursor().cloned(), item("iron_sword", 1));
    assert_eq!(alex.inventory().find_token("anvil"), None);
    Ok(())
}

#[tokio::test]
async fn crafting_without_a_token_changes_nothing() -> anyhow::Result<()> {
    let provider = provider_over(Arc::new(MemoryStore::new()));
    anvil_world(&provider).await?;

    let mut interaction = InteractionLoop::new(provider, "default");
    interaction.machine_mut().join(HeadlessPlayer::new(ALEX.0));
    let surface = interaction.machine_mut().open_crafting_view(ALEX, "ANVIL")?;
    fill(
        &mut interaction,
        surface,
        &[(0, "iron_ingot", 3), (1, "iron_ingot", 1), (4, "stick", 2)],
    );
    interaction.tick();
    let before = interaction.machine().surface(surface).map(|s| s.inputs().clone());

    let decision = interaction.machine_mut().click(surface, RESULT_SLOT, ClickKind::Pickup)?;
    assert_eq!(decision, Decision::Cancel);
    assert!(matches!(
        interaction.machine_mut().craft(surface),
        Err(CraftError::Validation(ValidationError::MissingToken(_)))
    ));

    let machine = interaction.machine();
    assert_eq!(machine.surface(surface).map(|s| s.inputs().clone()), before);
    let alex = machine.player(ALEX).expect("connected");
    assert_eq!(alex.inventory().cursor(), None);
    assert_eq!(
        alex.notices.first(),
        Some(&Notice::MissingToken {
            station_type: "anvil".to_string()
        })
    );
    Ok(())
}

#[tokio::test]
async fn editor_close_saves_and_reports() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let provider = provider_over(store.clone());
    anvil_world(&provider).await?;

    let mut interaction = InteractionLoop::new(provider.clone(), "default");
    interaction.machine_mut().join(HeadlessPlayer::new(ALEX.0));
    let editor = interaction
        .machine_mut()
        .open_editor(ALEX, "anvil", "anvil/sword")?;
    {
        let machine = interaction.machine_mut();
        let surface = machine.surface_mut(editor).expect("open");
        assert_eq!(surface.inputs()[4], item("stick", 1));
        surface.set_input(4, item("blaze_rod", 1));
    }
    // The result slot is free-form in the editor.
    if let Some(player) = interaction.machine_mut().player_mut(ALEX) {
        *player.inventory_mut().cursor_mut() = item("gold_sword", 1);
    }
    interaction.machine_mut().click(editor, RESULT_SLOT, ClickKind::Place)?;
    assert_eq!(
        interaction.machine().surface(editor).and_then(|s| s.result().cloned()),
        item("gold_sword", 1)
    );

    interaction.machine_mut().close(editor)?;
    assert!(timeout(Duration::from_secs(5), interaction.run_next()).await?);

    let alex = interaction.machine().player(ALEX).expect("connected");
    assert_eq!(
        alex.notices.last(),
        Some(&Notice::RecipeSaved {
            recipe_id: "anvil/sword".to_string()
        })
    );
    let cached = provider.cache().recipe("anvil/sword").expect("cached");
    assert_eq!(cached.grid[4], item("blaze_rod", 1));
    assert_eq!(cached.result, item("gold_sword", 1));
    assert!(store.recipe("anvil/sword")?.is_some());
    Ok(())
}

#[tokio::test]
async fn editor_save_failure_is_reported_and_cache_kept() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let provider = provider_over(store.clone());
    anvil_world(&provider).await?;

    let mut interaction = InteractionLoop::new(provider.clone(), "default");
    interaction.machine_mut().join(HeadlessPlayer::new(ALEX.0));
    let editor = interaction
        .machine_mut()
        .open_editor(ALEX, "anvil", "anvil/sword")?;
    if let Some(surface) = interaction.machine_mut().surface_mut(editor) {
        surface.set_input(0, None);
    }

    store.close();
    interaction.machine_mut().close(editor)?;
    assert!(timeout(Duration::from_secs(5), interaction.run_next()).await?);

    let alex = interaction.machine().player(ALEX).expect("connected");
    assert!(matches!(
        alex.notices.last(),
        Some(Notice::SaveFailed { recipe_id, .. }) if recipe_id == "anvil/sword"
    ));
    let cached = provider.cache().recipe("anvil/sword").expect("still cached");
    assert_eq!(cached.grid[0], item("iron_ingot", 1));
    Ok(())
}
