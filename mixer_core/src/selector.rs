//! Pump selection: which output of an ingredient fires, for how long, and
//! how many grams that represents.
//!
//! Planning, stock checks, consumption and estimation all go through
//! [`select_pump`], so they always agree on the pump and the quantity.

use crate::catalog::ResolvedIngredient;
use crate::config::ExecutionLimits;
use crate::error::ConfigurationError;
use crate::model::{NodeUid, PumpConfig, PumpKind};

/// Quantity an ingredient contributes at a given scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    /// Rate used for grams; the default rate when no pump is calibrated.
    pub ms_per_gram: f64,
    pub uses_default_rate: bool,
    /// Pump picked from the bootstrap estimate; decides whose rate applies.
    pub rate_source: PumpKind,
    /// Grams at the reference batch size.
    pub base_grams: f64,
    pub scaled_grams: f64,
    pub scaled_duration_ms: u64,
}

/// Grams and scaled duration for `reference_ms` at `scale`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resolve_quantity(
    pumps: &PumpConfig,
    reference_ms: u32,
    scale: f64,
    limits: &ExecutionLimits,
) -> Quantity {
    let reference = f64::from(reference_ms);
    let default_rate = limits.default_rate();
    let threshold = pumps.threshold_or(limits.default_threshold_g);

    let bootstrap_grams = reference / default_rate;
    let rate_source = prefer(bootstrap_grams, threshold);
    let calibrated = pumps
        .output(rate_source)
        .rate()
        .or_else(|| pumps.output(rate_source.other()).rate());
    let ms_per_gram = calibrated.map_or(default_rate, f64::from);

    let base_grams = reference / ms_per_gram;
    Quantity {
        ms_per_gram,
        uses_default_rate: calibrated.is_none(),
        rate_source,
        base_grams,
        scaled_grams: base_grams * scale,
        scaled_duration_ms: (reference * scale).round().max(0.0) as u64,
    }
}

/// Strictly below the threshold selects the small pump.
fn prefer(grams: f64, threshold_g: f64) -> PumpKind {
    if grams < threshold_g {
        PumpKind::Small
    } else {
        PumpKind::Large
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpSelection {
    pub kind: PumpKind,
    pub node: NodeUid,
    pub pin: u8,
    pub duration_ms: u64,
    pub quantity: Quantity,
}

impl PumpSelection {
    pub fn grams(&self) -> f64 {
        self.quantity.scaled_grams
    }
}

/// Choose the pump for `ingredient` at `scale`, falling back to the other
/// pump when the preferred one is not wired.
pub fn select_pump(
    ingredient: &ResolvedIngredient,
    reference_ms: Option<u32>,
    scale: f64,
    limits: &ExecutionLimits,
) -> Result<PumpSelection, ConfigurationError> {
    let reference_ms = reference_ms
        .filter(|ms| *ms > 0)
        .ok_or_else(|| ConfigurationError::MissingDuration {
            ingredient: ingredient.id,
            name: ingredient.name.clone(),
        })?;
    let pumps = &ingredient.pumps;
    let quantity = resolve_quantity(pumps, reference_ms, scale, limits);
    let preferred = prefer(
        quantity.scaled_grams,
        pumps.threshold_or(limits.default_threshold_g),
    );

    let (kind, (node, pin)) = [preferred, preferred.other()]
        .into_iter()
        .find_map(|kind| pumps.output(kind).wiring().map(|w| (kind, w)))
        .ok_or_else(|| ConfigurationError::NoPump {
            ingredient: ingredient.id,
            name: ingredient.name.clone(),
        })?;

    if kind != preferred {
        tracing::debug!(
            ingredient = %ingredient.name,
            preferred = %preferred,
            used = %kind,
            "preferred pump not wired, using the other one"
        );
    }

    Ok(PumpSelection {
        kind,
        node,
        pin,
        duration_ms: quantity.scaled_duration_ms,
        quantity,
    })
}
