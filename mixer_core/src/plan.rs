//! Plan builder: one actuation request per selected recipe line.

use std::collections::BTreeSet;

use crate::catalog::{Inventory, resolve};
use crate::config::ExecutionLimits;
use crate::error::ConfigurationError;
use crate::model::{IngredientId, NodeUid, PumpKind, Recipe, RecipeIngredient};
use crate::selector::select_pump;

/// Which recipe lines take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Lines whose stored `selected` flag is set.
    #[default]
    AsRecipe,
    /// Every line.
    All,
    /// Only these ingredients.
    Only(BTreeSet<IngredientId>),
}

impl Selection {
    pub fn includes(&self, item: &RecipeIngredient) -> bool {
        match self {
            Selection::AsRecipe => item.selected,
            Selection::All => true,
            Selection::Only(ids) => ids.contains(&item.ingredient_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientRef {
    pub id: IngredientId,
    pub name: String,
}

/// One pulse for one ingredient at the desired batch size.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationRequest {
    pub ingredient: IngredientRef,
    pub node: NodeUid,
    pub pin: u8,
    pub duration_ms: u64,
    pub pump: PumpKind,
    /// Grams this pulse dispenses; what the stock ledger checks and debits.
    pub grams: f64,
    pub ms_per_gram: f64,
    pub uses_default_rate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub recipe_name: String,
    pub desired_g: f64,
    pub scale_factor: f64,
    /// In `sequence_order`.
    pub requests: Vec<ActuationRequest>,
    /// Selected lines that could not be scheduled.
    pub errors: Vec<ConfigurationError>,
}

impl Plan {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn total_grams(&self) -> f64 {
        self.requests.iter().map(|r| r.grams).sum()
    }
}

/// Build the actuation plan for `recipe` scaled to `desired_g`.
///
/// Lines with no duration or no wired pump are reported in `Plan::errors`
/// and left out; the caller decides whether that blocks the run.
pub fn build_plan<I: Inventory + ?Sized>(
    recipe: &Recipe,
    desired_g: f64,
    selection: &Selection,
    inventory: &I,
    limits: &ExecutionLimits,
) -> Result<Plan, ConfigurationError> {
    if !(recipe.reference_batch_g.is_finite() && recipe.reference_batch_g > 0.0) {
        return Err(ConfigurationError::InvalidReferenceBatch(recipe.name.clone()));
    }
    if !(desired_g.is_finite() && desired_g > 0.0) {
        return Err(ConfigurationError::InvalidDesiredQuantity(desired_g));
    }
    let items: Vec<&RecipeIngredient> = recipe
        .ordered_items()
        .into_iter()
        .filter(|item| selection.includes(item))
        .collect();
    if items.is_empty() {
        return Err(ConfigurationError::NothingSelected);
    }

    let scale_factor = desired_g / recipe.reference_batch_g;
    let mut plan = Plan {
        recipe_name: recipe.name.clone(),
        desired_g,
        scale_factor,
        requests: Vec::with_capacity(items.len()),
        errors: Vec::new(),
    };

    for item in items {
        let selected = resolve(inventory, item.ingredient_id).and_then(|ing| {
            select_pump(&ing, item.reference_duration_ms, scale_factor, limits).map(|sel| (ing, sel))
        });
        match selected {
            Ok((ing, sel)) => plan.requests.push(ActuationRequest {
                ingredient: IngredientRef {
                    id: ing.id,
                    name: ing.name,
                },
                node: sel.node,
                pin: sel.pin,
                duration_ms: sel.duration_ms,
                pump: sel.kind,
                grams: sel.grams(),
                ms_per_gram: sel.quantity.ms_per_gram,
                uses_default_rate: sel.quantity.uses_default_rate,
            }),
            Err(e) => {
                tracing::warn!(ingredient = item.ingredient_id, error = %e, "line left out of plan");
                plan.errors.push(e);
            }
        }
    }
    Ok(plan)
}
