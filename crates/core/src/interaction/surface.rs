use crate::models::{empty_grid, ItemValue, Recipe, RecipeGrid};

use super::{layout::SlotRole, player::PlayerId};

/// Id of an open surface.
pub type SurfaceId = u64;

/// How a surface behaves, fixed when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceMode {
    /// Free editing of a recipe; saved on close.
    Editor {
        /// Record the contents are saved under.
        recipe_id: String,
    },
    /// Crafting against the cached recipes; the result is system-controlled.
    CraftingView,
}

/// What was opened, for which station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    /// Mode tag.
    pub mode: SurfaceMode,
    /// Normalized station type.
    pub station_type: String,
}

/// One open grid surface and its live slot contents.
#[derive(Debug, Clone)]
pub struct Surface {
    id: SurfaceId,
    viewer: PlayerId,
    descriptor: SurfaceDescriptor,
    inputs: RecipeGrid,
    result: Option<ItemValue>,
    pub(crate) recompute_scheduled: bool,
}

impl Surface {
    pub(crate) fn new(id: SurfaceId, viewer: PlayerId, descriptor: SurfaceDescriptor) -> Self {
        Self {
            id,
            viewer,
            descriptor,
            inputs: empty_grid(),
            result: None,
            recompute_scheduled: false,
        }
    }

    /// Show `recipe` in the slots.
    pub(crate) fn prefill(&mut self, recipe: &Recipe) {
        self.inputs = recipe.grid.clone();
        self.result = recipe.result.clone();
    }

    /// Surface id.
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Player looking at the surface.
    pub fn viewer(&self) -> PlayerId {
        self.viewer
    }

    /// Mode and station type.
    pub fn descriptor(&self) -> &SurfaceDescriptor {
        &self.descriptor
    }

    /// Station type.
    pub fn station_type(&self) -> &str {
        &self.descriptor.station_type
    }

    /// True for editor surfaces.
    pub fn is_editor(&self) -> bool {
        matches!(self.descriptor.mode, SurfaceMode::Editor { .. })
    }

    /// The nine input slots.
    pub fn inputs(&self) -> &RecipeGrid {
        &self.inputs
    }

    /// Current result slot.
    pub fn result(&self) -> Option<&ItemValue> {
        self.result.as_ref()
    }

    /// Put an item straight into input `index`, bypassing click rules.
    pub fn set_input(&mut self, index: usize, item: Option<ItemValue>) -> bool {
        match self.inputs.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_result(&mut self, item: Option<ItemValue>) {
        self.result = item;
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut RecipeGrid {
        &mut self.inputs
    }

    pub(crate) fn slot_mut(&mut self, role: SlotRole) -> Option<&mut Option<ItemValue>> {
        match role {
            SlotRole::Input(index) => self.inputs.get_mut(index),
            SlotRole::Result => Some(&mut self.result),
            SlotRole::Filler | SlotRole::Viewer(_) => None,
        }
    }

    /// The recipe an editor surface would save.
    pub(crate) fn to_recipe(&self) -> Option<Recipe> {
        match &self.descriptor.mode {
            SurfaceMode::Editor { recipe_id } => Some(Recipe::new(
                recipe_id.clone(),
                self.descriptor.station_type.clone(),
                self.inputs.clone(),
                self.result.clone(),
            )),
            SurfaceMode::CraftingView => None,
        }
    }

    /// Empty the inputs, returning whatever was in them.
    pub(crate) fn take_inputs(&mut self) -> Vec<ItemValue> {
        self.inputs
            .iter_mut()
            .filter_map(Option::take)
            .filter(|item| !item.is_empty())
            .collect()
    }
}
