//! Conversions from `mixer_config` file types to core types.

use crate::catalog::Catalog;
use crate::config::{ExecutionLimits, PinRules};
use crate::error::ConfigurationError;
use crate::model::{Ingredient, IngredientId, NodeUid, PumpOutput, Recipe, RecipeIngredient};
use mixer_config::{CalibrationRow, PumpSide};

// ── ExecutionLimits ──────────────────────────────────────────────────────────

impl From<&mixer_config::ExecutionCfg> for ExecutionLimits {
    fn from(c: &mixer_config::ExecutionCfg) -> Self {
        Self {
            max_segment_ms: c.max_segment_ms,
            max_batch_size: c.max_batch_size,
            sequential_settle_ms: c.sequential_settle_ms,
            parallel_margin_ms: c.parallel_margin_ms,
            inter_command_delay_ms: c.inter_command_delay_ms,
            default_ms_per_gram: c.default_ms_per_gram,
            default_threshold_g: c.default_threshold_g,
        }
    }
}

// ── PinRules ─────────────────────────────────────────────────────────────────

impl From<&mixer_config::PinsCfg> for PinRules {
    fn from(c: &mixer_config::PinsCfg) -> Self {
        Self {
            max_pin: c.max_pin,
            restricted: c.restricted.clone(),
            max_pins_per_uid: c.max_pins_per_uid,
        }
    }
}

// ── Ingredients ──────────────────────────────────────────────────────────────

fn pump_output(
    ingredient: IngredientId,
    entry: Option<&mixer_config::PumpEntry>,
) -> Result<PumpOutput, ConfigurationError> {
    let Some(entry) = entry else {
        return Ok(PumpOutput::default());
    };
    let node = entry
        .uid
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .map(|u| {
            u.parse::<NodeUid>()
                .map_err(|_| ConfigurationError::InvalidUid {
                    ingredient,
                    uid: u.to_string(),
                })
        })
        .transpose()?;
    Ok(PumpOutput {
        node,
        pin: entry.pin,
        ms_per_gram: entry.ms_per_gram,
    })
}

impl TryFrom<&mixer_config::IngredientEntry> for Ingredient {
    type Error = ConfigurationError;

    fn try_from(e: &mixer_config::IngredientEntry) -> Result<Self, Self::Error> {
        let mut ing = Ingredient::new(e.id, e.name.clone())
            .with_large(pump_output(e.id, e.large.as_ref())?)
            .with_small(pump_output(e.id, e.small.as_ref())?)
            .with_stock(e.stock_g);
        ing.cas = e.cas.clone();
        ing.pumps.threshold_g = e.threshold_g;
        ing.master_id = e.master_id;
        Ok(ing)
    }
}

// ── Recipes ──────────────────────────────────────────────────────────────────

impl From<&mixer_config::RecipeEntry> for Recipe {
    fn from(r: &mixer_config::RecipeEntry) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            reference_batch_g: r.reference_batch_g,
            items: r
                .items
                .iter()
                .map(|i| RecipeIngredient {
                    ingredient_id: i.ingredient_id,
                    reference_duration_ms: i.duration_ms,
                    sequence_order: i.order,
                    selected: i.selected,
                })
                .collect(),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────────────────

impl TryFrom<&mixer_config::InventoryFile> for Catalog {
    type Error = ConfigurationError;

    fn try_from(f: &mixer_config::InventoryFile) -> Result<Self, Self::Error> {
        let mut catalog = Catalog::new();
        for e in &f.ingredients {
            catalog.insert_ingredient(Ingredient::try_from(e)?);
        }
        for r in &f.recipes {
            catalog.insert_recipe(Recipe::from(r));
        }
        Ok(catalog)
    }
}

impl Catalog {
    /// Override pump rates from calibration rows; returns ids not in the catalog.
    pub fn apply_calibration(&mut self, rows: &[CalibrationRow]) -> Vec<IngredientId> {
        let mut unknown = Vec::new();
        for row in rows {
            let Some(ing) = self.get_mut(row.ingredient) else {
                unknown.push(row.ingredient);
                continue;
            };
            let out = match row.pump {
                PumpSide::Large => &mut ing.pumps.large,
                PumpSide::Small => &mut ing.pumps.small,
            };
            out.ms_per_gram = Some(row.ms_per_gram);
        }
        unknown
    }
}
