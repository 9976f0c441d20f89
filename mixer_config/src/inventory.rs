//! On-disk inventory: ingredients with their pump wiring and stock, and recipes.
//!
//! The file is plain TOML so operators can edit it by hand:
//!
//! ```toml
//! [[ingredient]]
//! id = 1
//! name = "Bergamot"
//! stock_g = 250.0
//! large = { uid = "0x1f", pin = 22, ms_per_gram = 20 }
//!
//! [[recipe]]
//! id = 1
//! name = "Cologne"
//! reference_batch_g = 100.0
//! [[recipe.item]]
//! ingredient_id = 1
//! duration_ms = 2000
//! ```
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One physical pump output of an ingredient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PumpEntry {
    /// Node UID, hex with or without `0x` prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Pin number on the node (analog A0 is 54).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_per_gram: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngredientEntry {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
    #[serde(default)]
    pub stock_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_g: Option<f64>,
    /// Same-substance ingredient whose pump configuration this one uses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<PumpEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<PumpEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecipeItemEntry {
    pub ingredient_id: u64,
    /// Pulse duration at the recipe's reference batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u32>,
    #[serde(default)]
    pub order: u32,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecipeEntry {
    pub id: u64,
    pub name: String,
    pub reference_batch_g: f64,
    #[serde(default, rename = "item")]
    pub items: Vec<RecipeItemEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InventoryFile {
    #[serde(default, rename = "ingredient")]
    pub ingredients: Vec<IngredientEntry>,
    #[serde(default, rename = "recipe")]
    pub recipes: Vec<RecipeEntry>,
}

impl InventoryFile {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Structural checks; pump wiring rules are audited separately.
    pub fn validate(&self) -> eyre::Result<()> {
        let mut ids = HashSet::new();
        for ing in &self.ingredients {
            if !ids.insert(ing.id) {
                eyre::bail!("duplicate ingredient id {}", ing.id);
            }
            if !(ing.stock_g.is_finite() && ing.stock_g >= 0.0) {
                eyre::bail!("ingredient {} ({}): stock_g must be >= 0", ing.id, ing.name);
            }
            if let Some(t) = ing.threshold_g
                && !(t.is_finite() && t > 0.0)
            {
                eyre::bail!("ingredient {} ({}): threshold_g must be > 0", ing.id, ing.name);
            }
            for pump in [&ing.large, &ing.small].into_iter().flatten() {
                if pump.ms_per_gram == Some(0) {
                    eyre::bail!("ingredient {} ({}): ms_per_gram must be > 0", ing.id, ing.name);
                }
            }
        }
        for ing in &self.ingredients {
            if let Some(master) = ing.master_id
                && !ids.contains(&master)
            {
                eyre::bail!(
                    "ingredient {} ({}): master_id {} does not exist",
                    ing.id,
                    ing.name,
                    master
                );
            }
        }

        let mut recipe_ids = HashSet::new();
        for r in &self.recipes {
            if !recipe_ids.insert(r.id) {
                eyre::bail!("duplicate recipe id {}", r.id);
            }
            if !(r.reference_batch_g.is_finite() && r.reference_batch_g > 0.0) {
                eyre::bail!("recipe {} ({}): reference_batch_g must be > 0", r.id, r.name);
            }
            let mut seen = HashSet::new();
            for item in &r.items {
                if !ids.contains(&item.ingredient_id) {
                    eyre::bail!(
                        "recipe {} ({}): unknown ingredient {}",
                        r.id,
                        r.name,
                        item.ingredient_id
                    );
                }
                if !seen.insert(item.ingredient_id) {
                    eyre::bail!(
                        "recipe {} ({}): ingredient {} listed twice",
                        r.id,
                        r.name,
                        item.ingredient_id
                    );
                }
            }
        }
        Ok(())
    }

    /// Overwrite the stock of one ingredient; returns false if the id is unknown.
    pub fn set_stock(&mut self, id: u64, grams: f64) -> bool {
        match self.ingredients.iter_mut().find(|i| i.id == id) {
            Some(ing) => {
                ing.stock_g = grams;
                true
            }
            None => false,
        }
    }
}
