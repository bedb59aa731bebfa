//! Station type naming, head records and capability tokens.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    cache::RecipeCache,
    codec,
    error::{Result, ValidationError},
    models::ItemValue,
};

/// Suffix of the reserved per-type head-item record id.
pub const HEAD_RECORD_SUFFIX: &str = "/__head__";

static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_\-]{0,63}$").expect("invalid station type regex")
});

/// Case-fold a station type so `Workbench` and `workbench` are one type.
pub fn normalize_type(station_type: &str) -> String {
    station_type.trim().to_lowercase()
}

/// Normalize and check a station type name.
pub fn validate_type_name(station_type: &str) -> Result<String> {
    let normalized = normalize_type(station_type);
    if TYPE_NAME_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidTypeName(station_type.to_string()).into())
    }
}

/// Reserved record id holding a station's head item.
pub fn head_record_id(station_type: &str) -> String {
    format!("{}{}", normalize_type(station_type), HEAD_RECORD_SUFFIX)
}

/// Whether `id` is a reserved head-item record.
pub fn is_head_record(id: &str) -> bool {
    id.ends_with(HEAD_RECORD_SUFFIX)
}

/// Conventional recipe id `<type>/<name>`.
pub fn recipe_id(station_type: &str, name: &str) -> String {
    format!("{}/{}", normalize_type(station_type), name.trim())
}

/// Build a capability token for `station_type` from its cached head item.
pub fn issue_token(cache: &RecipeCache, station_type: &str) -> Result<ItemValue> {
    let station_type = normalize_type(station_type);
    let encoded = cache
        .head_item(&station_type)
        .ok_or_else(|| ValidationError::UnknownType(station_type.clone()))?;
    let head = codec::try_decode(&encoded)?;
    Ok(head.tagged_for(&station_type))
}

/// One row of an editor list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    /// Recipe id.
    pub id: String,
    /// Icon to show; the recipe's result when it has one.
    pub icon: Option<ItemValue>,
}

/// Recipes of a type as shown in an editor list.
///
/// Head records never reach the cache, so every entry is a real recipe.
pub fn editor_listing(cache: &RecipeCache, station_type: &str) -> Vec<RecipeSummary> {
    cache
        .recipes(&normalize_type(station_type))
        .iter()
        .map(|recipe| RecipeSummary {
            id: recipe.id.clone(),
            icon: recipe.result.clone(),
        })
        .collect()
}
