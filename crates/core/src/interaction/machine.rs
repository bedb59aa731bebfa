use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    cache::RecipeCache,
    error::{CraftError, Result, ValidationError},
    models::{ItemValue, Recipe},
    provider::SyncProvider,
    station,
};

use super::{
    layout::{self, SlotRole},
    player::{Notice, Player, PlayerId},
    scheduler::LoopHandle,
    surface::{Surface, SurfaceDescriptor, SurfaceId, SurfaceMode},
};

/// Whether the platform should let an interaction through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apply the interaction.
    Allow,
    /// Undo / ignore the interaction.
    Cancel,
}

/// Kind of a click on a raw slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// Pick the slot's stack up onto the cursor.
    Pickup,
    /// Put the cursor stack into the slot.
    Place,
    /// Move the stack to the other side of the view.
    ShiftMove,
    /// Eject the stack into the world.
    Drop,
}

/// Per-loop controller for station surfaces.
///
/// Lives on the interaction loop and is only ever touched from there; the
/// provider's completions come back through the loop's [`LoopHandle`].
pub struct InteractionMachine<P: Player> {
    cache: Arc<RecipeCache>,
    provider: SyncProvider,
    default_type: String,
    handle: LoopHandle<InteractionMachine<P>>,
    players: HashMap<PlayerId, P>,
    surfaces: HashMap<SurfaceId, Surface>,
    open_by_player: HashMap<PlayerId, SurfaceId>,
    next_surface: SurfaceId,
}

impl<P: Player> InteractionMachine<P> {
    /// Machine reading `provider`'s cache; `default_type` needs no token.
    pub fn new(
        provider: SyncProvider,
        default_type: &str,
        handle: LoopHandle<InteractionMachine<P>>,
    ) -> Self {
        Self {
            cache: Arc::clone(provider.cache()),
            provider,
            default_type: station::normalize_type(default_type),
            handle,
            players: HashMap::new(),
            surfaces: HashMap::new(),
            open_by_player: HashMap::new(),
            next_surface: 1,
        }
    }

    /// Cache this machine matches against.
    pub fn cache(&self) -> &Arc<RecipeCache> {
        &self.cache
    }

    /// Add a connected player.
    pub fn join(&mut self, player: P) {
        let id = player.id();
        debug!(player = %id, "Player joined");
        self.players.insert(id, player);
    }

    /// Remove a player, closing their surface first.
    pub fn leave(&mut self, id: PlayerId) -> Option<P> {
        if let Some(surface) = self.open_by_player.get(&id).copied() {
            if let Err(err) = self.close(surface) {
                warn!(player = %id, error = %err, "Closing surface on leave failed");
            }
        }
        self.players.remove(&id)
    }

    /// Connected player.
    pub fn player(&self, id: PlayerId) -> Option<&P> {
        self.players.get(&id)
    }

    /// Mutable connected player.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut P> {
        self.players.get_mut(&id)
    }

    /// Open surface.
    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Mutable open surface.
    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Surface a player is looking at.
    pub fn open_surface_of(&self, player: PlayerId) -> Option<SurfaceId> {
        self.open_by_player.get(&player).copied()
    }

    /// Open an editor for `recipe_id`, prefilled from the cache when it exists.
    pub fn open_editor(
        &mut self,
        player: PlayerId,
        station_type: &str,
        recipe_id: &str,
    ) -> Result<SurfaceId> {
        let station_type = station::normalize_type(station_type);
        if !self.cache.type_exists(&station_type) {
            return Err(ValidationError::UnknownType(station_type).into());
        }
        if station::is_head_record(recipe_id) {
            return Err(ValidationError::ReservedId(recipe_id.to_string()).into());
        }
        let existing = self.cache.recipe(recipe_id);
        let descriptor = SurfaceDescriptor {
            mode: SurfaceMode::Editor {
                recipe_id: recipe_id.to_string(),
            },
            station_type,
        };
        let id = self.open(player, descriptor)?;
        if let (Some(recipe), Some(surface)) = (existing, self.surfaces.get_mut(&id)) {
            surface.prefill(&recipe);
        }
        Ok(id)
    }

    /// Open an empty crafting view for `station_type`.
    pub fn open_crafting_view(&mut self, player: PlayerId, station_type: &str) -> Result<SurfaceId> {
        let station_type = station::normalize_type(station_type);
        if station_type != self.default_type && !self.cache.type_exists(&station_type) {
            return Err(ValidationError::UnknownType(station_type).into());
        }
        self.open(
            player,
            SurfaceDescriptor {
                mode: SurfaceMode::CraftingView,
                station_type,
            },
        )
    }

    fn open(&mut self, player: PlayerId, descriptor: SurfaceDescriptor) -> Result<SurfaceId> {
        if !self.players.contains_key(&player) {
            return Err(ValidationError::UnknownPlayer(player.0).into());
        }
        if let Some(previous) = self.open_by_player.get(&player).copied() {
            self.close(previous)?;
        }
        let id = self.next_surface;
        self.next_surface += 1;
        debug!(surface = id, player = %player, station_type = %descriptor.station_type, mode = ?descriptor.mode, "Surface opened");
        self.surfaces.insert(id, Surface::new(id, player, descriptor));
        self.open_by_player.insert(player, id);
        Ok(id)
    }

    /// A click on `raw_slot` of an open surface.
    pub fn click(&mut self, surface: SurfaceId, raw_slot: usize, kind: ClickKind) -> Result<Decision> {
        let (editor, viewer) = {
            let open = self.surfaces.get(&surface).ok_or(ValidationError::UnknownSurface(surface))?;
            (open.is_editor(), open.viewer())
        };
        if kind == ClickKind::Drop {
            return Ok(Decision::Cancel);
        }

        let role = layout::classify(raw_slot);
        match role {
            SlotRole::Filler => return Ok(Decision::Cancel),
            SlotRole::Result if !editor => {
                if let Err(err) = self.craft(surface) {
                    match err {
                        CraftError::Validation(ValidationError::MissingToken(_)) => {}
                        other => return Err(other),
                    }
                }
                return Ok(Decision::Cancel);
            }
            _ => {}
        }

        let (Some(open), Some(player)) = (self.surfaces.get_mut(&surface), self.players.get_mut(&viewer)) else {
            return Ok(Decision::Cancel);
        };
        let inventory = player.inventory_mut();
        let touched_grid = match (role, kind) {
            (SlotRole::Viewer(index), ClickKind::ShiftMove) => {
                let Some(slot) = inventory.slot_mut(index) else {
                    return Ok(Decision::Cancel);
                };
                if let Some(item) = slot.take() {
                    *slot = fill_inputs(open.inputs_mut(), item);
                }
                true
            }
            (SlotRole::Viewer(index), _) => {
                let mut cursor = inventory.cursor_mut().take();
                if let Some(slot) = inventory.slot_mut(index) {
                    exchange(kind, &mut cursor, slot);
                }
                *inventory.cursor_mut() = cursor;
                false
            }
            (role, ClickKind::ShiftMove) => {
                if let Some(slot) = open.slot_mut(role) {
                    if let Some(item) = slot.take() {
                        *slot = inventory.add_item(item);
                    }
                }
                true
            }
            (role, kind) => {
                if let Some(slot) = open.slot_mut(role) {
                    exchange(kind, inventory.cursor_mut(), slot);
                }
                true
            }
        };

        if touched_grid && !editor {
            self.schedule_recompute(surface);
        }
        Ok(Decision::Allow)
    }

    /// A drag spreading the cursor stack over `raw_slots`.
    pub fn drag(&mut self, surface: SurfaceId, raw_slots: &[usize]) -> Result<Decision> {
        let open = self.surfaces.get_mut(&surface).ok_or(ValidationError::UnknownSurface(surface))?;
        let editor = open.is_editor();
        let roles: Vec<SlotRole> = raw_slots.iter().map(|raw| layout::classify(*raw)).collect();
        let blocked = roles.iter().any(|role| match role {
            SlotRole::Filler => true,
            SlotRole::Result => !editor,
            _ => false,
        });
        if blocked || roles.is_empty() {
            return Ok(Decision::Cancel);
        }

        let Some(player) = self.players.get_mut(&open.viewer()) else {
            return Ok(Decision::Cancel);
        };
        let inventory = player.inventory_mut();
        let Some(mut stack) = inventory.cursor_mut().take() else {
            return Ok(Decision::Cancel);
        };

        let share = (stack.amount / roles.len() as u32).max(1);
        let mut touched_grid = false;
        for role in &roles {
            if stack.amount == 0 {
                break;
            }
            let slot = match role {
                SlotRole::Viewer(index) => inventory.slot_mut(*index),
                other => {
                    touched_grid = true;
                    open.slot_mut(*other)
                }
            };
            let Some(slot) = slot else { continue };
            let portion = stack.with_amount(share.min(stack.amount));
            let moved = portion.amount;
            let left = match slot {
                Some(existing) if !existing.is_empty() => existing.merge(portion),
                empty => {
                    *empty = Some(portion);
                    None
                }
            };
            stack.amount -= moved - left.map(|item| item.amount).unwrap_or(0);
        }
        *inventory.cursor_mut() = (stack.amount > 0).then_some(stack);

        if touched_grid && !editor {
            self.schedule_recompute(surface);
        }
        Ok(Decision::Allow)
    }

    fn schedule_recompute(&mut self, surface: SurfaceId) {
        let Some(open) = self.surfaces.get_mut(&surface) else {
            return;
        };
        if open.recompute_scheduled {
            return;
        }
        open.recompute_scheduled = true;
        self.handle.defer(move |machine: &mut Self| machine.recompute(surface));
    }

    /// Set a crafting view's result from the current grid. No-op for editors
    /// and closed surfaces.
    pub fn recompute(&mut self, surface: SurfaceId) {
        let Some(open) = self.surfaces.get_mut(&surface) else {
            return;
        };
        open.recompute_scheduled = false;
        if open.is_editor() {
            return;
        }
        let matched = self.cache.match_recipe(open.station_type(), open.inputs());
        debug!(
            surface,
            station_type = %open.station_type(),
            recipe_id = matched.as_ref().map(|recipe| recipe.id.as_str()),
            "Result recomputed"
        );
        open.set_result(matched.and_then(|recipe| recipe.result.clone()));
    }

    /// Take the result of a crafting view.
    ///
    /// `Ok(None)` when the grid matches nothing. Ingredients, token and
    /// result only change once every check has passed.
    pub fn craft(&mut self, surface: SurfaceId) -> Result<Option<ItemValue>> {
        let open = self.surfaces.get_mut(&surface).ok_or(ValidationError::UnknownSurface(surface))?;
        if open.is_editor() {
            return Err(ValidationError::WrongMode {
                surface,
                operation: "craft",
            }
            .into());
        }
        let station_type = open.station_type().to_string();
        let Some(recipe) = self.cache.match_recipe(&station_type, open.inputs()) else {
            return Ok(None);
        };
        let Some(result) = recipe.result.clone() else {
            return Ok(None);
        };
        let Some(player) = self.players.get_mut(&open.viewer()) else {
            return Ok(None);
        };

        if station_type != self.default_type {
            let Some(token) = player.inventory().find_token(&station_type) else {
                player.notify(Notice::MissingToken {
                    station_type: station_type.clone(),
                });
                return Err(ValidationError::MissingToken(station_type).into());
            };
            player.inventory_mut().take_one(token);
        }

        consume_inputs(&recipe, open.inputs_mut());
        deliver(player, result.clone());
        info!(surface, recipe_id = %recipe.id, player = %player.id(), "Crafted");

        self.recompute(surface);
        Ok(Some(result))
    }

    /// Close a surface. Editors are saved; crafting views hand back their inputs.
    pub fn close(&mut self, surface: SurfaceId) -> Result<()> {
        let mut open = self.surfaces.remove(&surface).ok_or(ValidationError::UnknownSurface(surface))?;
        let viewer = open.viewer();
        if self.open_by_player.get(&viewer) == Some(&surface) {
            self.open_by_player.remove(&viewer);
        }

        match open.to_recipe() {
            Some(recipe) => self.save_editor(viewer, recipe),
            None => {
                let leftovers = open.take_inputs();
                if let Some(player) = self.players.get_mut(&viewer) {
                    for item in leftovers {
                        player.give(item);
                    }
                }
            }
        }
        debug!(surface, player = %viewer, "Surface closed");
        Ok(())
    }

    fn save_editor(&mut self, viewer: PlayerId, recipe: Recipe) {
        let recipe_id = recipe.id.clone();
        let pending = self.provider.save_recipe(recipe);
        self.handle.after(
            self.provider.runtime(),
            pending,
            move |machine: &mut Self, outcome| {
                let notice = match outcome {
                    Ok(()) => Notice::RecipeSaved { recipe_id },
                    Err(err) => Notice::SaveFailed {
                        recipe_id,
                        reason: err.to_string(),
                    },
                };
                if let Some(player) = machine.players.get_mut(&viewer) {
                    player.notify(notice);
                }
            },
        );
    }

    /// A player uses (right-clicks) `item` outside any surface.
    ///
    /// Tokens are never used as blocks; they open their station instead.
    pub fn use_head_item(&mut self, player: PlayerId, item: &ItemValue) -> Decision {
        let Some(station_type) = item.station_tag().map(str::to_string) else {
            return Decision::Allow;
        };
        if self.cache.recipes(&station_type).is_empty() {
            self.notify(player, Notice::NoRecipes { station_type });
            return Decision::Cancel;
        }
        if let Err(err) = self.open_crafting_view(player, &station_type) {
            self.notify(player, Notice::Error(err.to_string()));
        }
        Decision::Cancel
    }

    /// A player places `item` as a block.
    pub fn place_block(&mut self, player: PlayerId, item: &ItemValue) -> Decision {
        if item.station_tag().is_none() {
            return Decision::Allow;
        }
        self.notify(player, Notice::PlaceProtected);
        Decision::Cancel
    }

    /// A player drops `item` from their own inventory.
    pub fn drop_item(&mut self, player: PlayerId, item: &ItemValue) -> Decision {
        let crafting = self
            .open_by_player
            .get(&player)
            .and_then(|id| self.surfaces.get(id))
            .map(|surface| !surface.is_editor())
            .unwrap_or(false);
        if crafting && !item.is_empty() && item.station_tag().is_some() {
            self.notify(player, Notice::DropProtected);
            return Decision::Cancel;
        }
        Decision::Allow
    }

    fn notify(&mut self, player: PlayerId, notice: Notice) {
        if let Some(player) = self.players.get_mut(&player) {
            player.notify(notice);
        }
    }
}

/// Platform behavior of a plain click between the cursor and a slot.
fn exchange(kind: ClickKind, cursor: &mut Option<ItemValue>, slot: &mut Option<ItemValue>) {
    match (kind, cursor.take(), slot.take()) {
        (_, None, taken) => *cursor = taken,
        (ClickKind::Pickup, Some(mut held), Some(item)) => {
            *slot = held.merge(item);
            *cursor = Some(held);
        }
        (_, Some(held), None) => *slot = Some(held),
        (_, Some(held), Some(mut item)) => {
            if item.is_similar(&held) {
                *cursor = item.merge(held);
                *slot = Some(item);
            } else {
                *cursor = Some(item);
                *slot = Some(held);
            }
        }
    }
}

/// Shift-move into the grid: similar stacks first, then empty inputs.
fn fill_inputs(inputs: &mut [Option<ItemValue>], item: ItemValue) -> Option<ItemValue> {
    let mut left = Some(item);
    for stack in inputs.iter_mut().flatten().filter(|stack| !stack.is_empty()) {
        let Some(item) = left.take() else { break };
        left = stack.merge(item);
    }
    for slot in inputs.iter_mut() {
        if slot.is_none() {
            *slot = left.take();
        }
    }
    left
}

fn consume_inputs(recipe: &Recipe, inputs: &mut [Option<ItemValue>]) {
    for (expected, slot) in recipe.grid.iter().zip(inputs.iter_mut()) {
        let Some(expected) = expected.as_ref().filter(|item| !item.is_empty()) else {
            continue;
        };
        *slot = slot
            .take()
            .and_then(|item| {
                let remaining = item.amount.saturating_sub(expected.amount);
                (remaining > 0).then(|| item.with_amount(remaining))
            });
    }
}

/// Cursor first when it is empty or holds the same item, storage after, world last.
fn deliver<P: Player>(player: &mut P, result: ItemValue) {
    let cursor = player.inventory_mut().cursor_mut();
    let overflow = match cursor {
        None => {
            *cursor = Some(result);
            None
        }
        Some(held) if held.is_empty() => {
            *cursor = Some(result);
            None
        }
        Some(held) => held.merge(result),
    };
    if let Some(item) = overflow {
        player.give(item);
    }
}
