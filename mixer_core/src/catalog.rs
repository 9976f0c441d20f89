//! Ingredient/recipe repository port and the in-memory catalog.

use std::collections::{BTreeMap, HashSet};

use mixer_traits::BoxError;

use crate::error::ConfigurationError;
use crate::model::{Ingredient, IngredientId, PumpConfig, Recipe, RecipeId};

/// Read access to ingredients, write access limited to stock.
pub trait Inventory {
    fn ingredient(&self, id: IngredientId) -> Option<Ingredient>;
    fn set_stock(&mut self, id: IngredientId, grams: f64) -> Result<(), BoxError>;
}

impl<T: Inventory + ?Sized> Inventory for Box<T> {
    fn ingredient(&self, id: IngredientId) -> Option<Ingredient> {
        (**self).ingredient(id)
    }
    fn set_stock(&mut self, id: IngredientId, grams: f64) -> Result<(), BoxError> {
        (**self).set_stock(id, grams)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    ingredients: BTreeMap<IngredientId, Ingredient>,
    recipes: BTreeMap<RecipeId, Recipe>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ingredient(mut self, ingredient: Ingredient) -> Self {
        self.insert_ingredient(ingredient);
        self
    }

    pub fn with_recipe(mut self, recipe: Recipe) -> Self {
        self.insert_recipe(recipe);
        self
    }

    pub fn insert_ingredient(&mut self, ingredient: Ingredient) {
        self.ingredients.insert(ingredient.id, ingredient);
    }

    pub fn insert_recipe(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.id, recipe);
    }

    pub fn get(&self, id: IngredientId) -> Option<&Ingredient> {
        self.ingredients.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: IngredientId) -> Option<&mut Ingredient> {
        self.ingredients.get_mut(&id)
    }

    pub fn ingredients(&self) -> impl Iterator<Item = &Ingredient> {
        self.ingredients.values()
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    /// Case-insensitive lookup by recipe name.
    pub fn recipe_by_name(&self, name: &str) -> Option<&Recipe> {
        let wanted = name.trim();
        self.recipes
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    /// Pump configuration actually used for `id`, after master delegation.
    pub fn effective_pumps(&self, id: IngredientId) -> Result<PumpConfig, ConfigurationError> {
        resolve(self, id).map(|r| r.pumps)
    }
}

impl Inventory for Catalog {
    fn ingredient(&self, id: IngredientId) -> Option<Ingredient> {
        self.ingredients.get(&id).cloned()
    }

    fn set_stock(&mut self, id: IngredientId, grams: f64) -> Result<(), BoxError> {
        let ing = self
            .ingredients
            .get_mut(&id)
            .ok_or_else(|| format!("ingredient {id} not found"))?;
        ing.stock_g = grams;
        Ok(())
    }
}

/// An ingredient with its effective pump configuration.
///
/// Stock and name always belong to the requested ingredient, never to its master.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIngredient {
    pub id: IngredientId,
    pub name: String,
    pub stock_g: f64,
    pub pumps: PumpConfig,
    /// Ingredient whose pumps were borrowed, when delegated.
    pub master: Option<IngredientId>,
}

impl ResolvedIngredient {
    pub fn is_delegated(&self) -> bool {
        self.master.is_some()
    }
}

/// Follow `master_id` links to the ingredient that owns the pumps.
pub fn resolve<I: Inventory + ?Sized>(
    inventory: &I,
    id: IngredientId,
) -> Result<ResolvedIngredient, ConfigurationError> {
    let own = inventory
        .ingredient(id)
        .ok_or(ConfigurationError::UnknownIngredient(id))?;
    let mut seen = HashSet::from([id]);
    let mut owner = own.clone();
    while let Some(master) = owner.master_id {
        if !seen.insert(master) {
            return Err(ConfigurationError::MasterCycle {
                ingredient: id,
                name: own.name,
            });
        }
        owner = inventory
            .ingredient(master)
            .ok_or_else(|| ConfigurationError::DanglingMaster {
                ingredient: id,
                name: own.name.clone(),
                master,
            })?;
    }
    Ok(ResolvedIngredient {
        id,
        stock_g: own.stock_g,
        pumps: owner.pumps,
        master: (owner.id != id).then_some(owner.id),
        name: own.name,
    })
}
