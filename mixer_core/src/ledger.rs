//! Stock ledger: pre-flight availability and post-run debit.

use crate::catalog::{Inventory, resolve};
use crate::config::ExecutionLimits;
use crate::model::{IngredientId, Recipe};
use crate::plan::{ActuationRequest, Selection};
use crate::selector::resolve_quantity;

/// One ingredient whose stock does not cover the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub ingredient: IngredientId,
    pub name: String,
    pub needed_g: f64,
    pub available_g: f64,
    pub missing_g: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Sufficient,
    Insufficient(Vec<Shortfall>),
}

impl Availability {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Availability::Sufficient)
    }

    pub fn shortfalls(&self) -> &[Shortfall] {
        match self {
            Availability::Sufficient => &[],
            Availability::Insufficient(list) => list,
        }
    }
}

/// Grams needed per ingredient, in first-appearance order.
fn needs(requests: &[ActuationRequest]) -> Vec<(IngredientId, &str, f64)> {
    let mut out: Vec<(IngredientId, &str, f64)> = Vec::new();
    for r in requests {
        match out.iter_mut().find(|(id, _, _)| *id == r.ingredient.id) {
            Some((_, _, g)) => *g += r.grams,
            None => out.push((r.ingredient.id, r.ingredient.name.as_str(), r.grams)),
        }
    }
    out
}

/// Compare every planned ingredient against its current stock.
///
/// All shortfalls are collected; an unknown ingredient counts as zero stock.
pub fn check_availability<I: Inventory + ?Sized>(
    requests: &[ActuationRequest],
    inventory: &I,
) -> Availability {
    let shortfalls: Vec<Shortfall> = needs(requests)
        .into_iter()
        .filter_map(|(id, name, needed_g)| {
            let available_g = inventory.ingredient(id).map_or(0.0, |i| i.stock_g);
            (needed_g > available_g).then(|| Shortfall {
                ingredient: id,
                name: name.to_string(),
                needed_g,
                available_g,
                missing_g: needed_g - available_g,
            })
        })
        .collect();
    if shortfalls.is_empty() {
        Availability::Sufficient
    } else {
        Availability::Insufficient(shortfalls)
    }
}

/// Stock movement of one ingredient.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumption {
    pub ingredient: IngredientId,
    pub name: String,
    pub before_g: f64,
    pub consumed_g: f64,
    pub after_g: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeReport {
    pub consumed: Vec<Consumption>,
    /// Ingredients whose new stock could not be persisted.
    pub failures: Vec<(IngredientId, String)>,
}

/// Debit the grams of a completed run, clamping stock at zero.
///
/// Each ingredient is persisted on its own; a failure is recorded and the
/// remaining ingredients are still debited.
pub fn consume<I: Inventory + ?Sized>(requests: &[ActuationRequest], inventory: &mut I) -> ConsumeReport {
    let mut report = ConsumeReport::default();
    for (id, name, grams) in needs(requests) {
        let Some(ing) = inventory.ingredient(id) else {
            report.failures.push((id, format!("ingredient {id} not found")));
            continue;
        };
        let after_g = (ing.stock_g - grams).max(0.0);
        match inventory.set_stock(id, after_g) {
            Ok(()) => {
                tracing::info!(ingredient = name, before = ing.stock_g, consumed = grams, after = after_g, "stock debited");
                report.consumed.push(Consumption {
                    ingredient: id,
                    name: name.to_string(),
                    before_g: ing.stock_g,
                    consumed_g: grams,
                    after_g,
                });
            }
            Err(e) => {
                tracing::error!(ingredient = name, error = %e, "failed to persist stock");
                report.failures.push((id, e.to_string()));
            }
        }
    }
    report
}

/// Largest batch the current stock can produce, in whole grams.
///
/// Lines without a duration or with an unknown ingredient are skipped.
/// Returns 0 when nothing usable is selected or a selected ingredient is out
/// of stock, and at least 1 when every ratio is positive.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn max_producible_grams<I: Inventory + ?Sized>(
    recipe: &Recipe,
    selection: &Selection,
    inventory: &I,
    limits: &ExecutionLimits,
) -> u64 {
    let mut min_ratio: Option<f64> = None;
    for item in recipe.items.iter().filter(|i| selection.includes(i)) {
        let Some(reference_ms) = item.reference_duration_ms.filter(|ms| *ms > 0) else {
            continue;
        };
        let Ok(ing) = resolve(inventory, item.ingredient_id) else {
            continue;
        };
        let base = resolve_quantity(&ing.pumps, reference_ms, 1.0, limits).base_grams;
        if base <= 0.0 {
            continue;
        }
        let ratio = ing.stock_g.max(0.0) / base;
        min_ratio = Some(min_ratio.map_or(ratio, |m| m.min(ratio)));
    }
    match min_ratio {
        Some(r) if r > 0.0 => ((r * recipe.reference_batch_g).floor() as u64).max(1),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::{Ingredient, NodeUid, PumpKind, RecipeIngredient};
    use crate::plan::IngredientRef;

    fn req(id: u64, grams: f64) -> ActuationRequest {
        ActuationRequest {
            ingredient: IngredientRef {
                id,
                name: format!("ing{id}"),
            },
            node: NodeUid(1),
            pin: 3,
            duration_ms: 100,
            pump: PumpKind::Large,
            grams,
            ms_per_gram: 20.0,
            uses_default_rate: true,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new()
            .with_ingredient(Ingredient::new(1, "ing1").with_stock(10.0))
            .with_ingredient(Ingredient::new(2, "ing2").with_stock(1.0))
            .with_ingredient(Ingredient::new(3, "ing3").with_stock(0.5))
    }

    #[test]
    fn collects_every_shortfall() {
        let reqs = [req(1, 5.0), req(2, 2.0), req(3, 1.5), req(4, 1.0)];
        let avail = check_availability(&reqs, &catalog());
        let ids: Vec<_> = avail.shortfalls().iter().map(|s| s.ingredient).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(avail.shortfalls()[0].missing_g, 1.0);
        assert_eq!(avail.shortfalls()[2].available_g, 0.0);
    }

    #[test]
    fn repeated_ingredient_needs_are_summed() {
        let avail = check_availability(&[req(1, 6.0), req(1, 6.0)], &catalog());
        assert_eq!(avail.shortfalls().len(), 1);
        assert_eq!(avail.shortfalls()[0].needed_g, 12.0);
        assert!(check_availability(&[req(1, 10.0)], &catalog()).is_sufficient());
    }

    #[test]
    fn consume_clamps_at_zero() {
        let mut cat = catalog();
        let report = consume(&[req(1, 4.0), req(2, 3.0)], &mut cat);
        assert!(report.failures.is_empty());
        assert_eq!(cat.get(1).map(|i| i.stock_g), Some(6.0));
        assert_eq!(cat.get(2).map(|i| i.stock_g), Some(0.0));
        assert_eq!(report.consumed[1].after_g, 0.0);
    }

    #[test]
    fn max_producible_uses_the_scarcest_ingredient() {
        let limits = ExecutionLimits::default();
        let recipe = Recipe {
            id: 1,
            name: "r".into(),
            reference_batch_g: 100.0,
            // 200 ms at 20 ms/g = 10 g per 100 g batch; 20 ms = 1 g.
            items: vec![RecipeIngredient::new(1, 200, 0), RecipeIngredient::new(2, 20, 1)],
        };
        // ing1: 10/10 = 1.0, ing2: 1/1 = 1.0
        assert_eq!(max_producible_grams(&recipe, &Selection::All, &catalog(), &limits), 100);

        let mut cat = catalog();
        cat.set_stock(2, 0.25).unwrap();
        assert_eq!(max_producible_grams(&recipe, &Selection::All, &cat, &limits), 25);

        cat.set_stock(2, 0.0).unwrap();
        assert_eq!(max_producible_grams(&recipe, &Selection::All, &cat, &limits), 0);

        cat.set_stock(2, 0.001).unwrap();
        assert_eq!(max_producible_grams(&recipe, &Selection::All, &cat, &limits), 1);
    }
}
