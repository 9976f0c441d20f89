//! Domain model: ingredients with their pump wiring, recipes, node addresses.

use std::fmt;
use std::str::FromStr;

pub type IngredientId = u64;
pub type RecipeId = u64;

/// First analog pin on the controller nodes (A0).
pub const ANALOG_PIN_BASE: u8 = 54;
/// Number of analog pins (A0..=A15).
pub const ANALOG_PIN_COUNT: u8 = 16;

/// Numeric address of a controller node on the shared bus.
///
/// Parses `0x1F`, `0X1f` and bare hex (`001f`); always renders as `0x` +
/// lowercase hex without leading zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeUid(pub u32);

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node uid {0:?}")]
pub struct ParseUidError(pub String);

impl FromStr for NodeUid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t
            .strip_prefix("0x")
            .or_else(|| t.strip_prefix("0X"))
            .unwrap_or(t);
        if digits.is_empty() {
            return Err(ParseUidError(s.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(NodeUid)
            .map_err(|_| ParseUidError(s.to_string()))
    }
}

/// Which physical pump of an ingredient fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpKind {
    Large,
    Small,
}

impl PumpKind {
    pub fn other(self) -> Self {
        match self {
            PumpKind::Large => PumpKind::Small,
            PumpKind::Small => PumpKind::Large,
        }
    }
}

impl fmt::Display for PumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PumpKind::Large => "LARGE",
            PumpKind::Small => "SMALL",
        })
    }
}

/// One pump output: the node and pin driving it, and its calibrated rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpOutput {
    pub node: Option<NodeUid>,
    pub pin: Option<u8>,
    pub ms_per_gram: Option<u32>,
}

impl PumpOutput {
    pub fn wired(node: NodeUid, pin: u8) -> Self {
        Self {
            node: Some(node),
            pin: Some(pin),
            ms_per_gram: None,
        }
    }

    pub fn with_rate(mut self, ms_per_gram: u32) -> Self {
        self.ms_per_gram = Some(ms_per_gram);
        self
    }

    /// Node and pin, when both are configured.
    pub fn wiring(&self) -> Option<(NodeUid, u8)> {
        Some((self.node?, self.pin?))
    }

    /// Calibrated rate; zero counts as unset.
    pub fn rate(&self) -> Option<u32> {
        self.ms_per_gram.filter(|r| *r > 0)
    }
}

/// Pump configuration of an ingredient (own or delegated from its master).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PumpConfig {
    pub large: PumpOutput,
    pub small: PumpOutput,
    /// Grams boundary: strictly below selects the small pump.
    pub threshold_g: Option<f64>,
}

impl PumpConfig {
    pub fn output(&self, kind: PumpKind) -> &PumpOutput {
        match kind {
            PumpKind::Large => &self.large,
            PumpKind::Small => &self.small,
        }
    }

    /// Effective threshold; unset or non-positive values fall back to `default_g`.
    pub fn threshold_or(&self, default_g: f64) -> f64 {
        match self.threshold_g {
            Some(t) if t.is_finite() && t > 0.0 => t,
            _ => default_g,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub cas: Option<String>,
    pub pumps: PumpConfig,
    pub stock_g: f64,
    /// Same-substance ingredient whose pump configuration is used instead.
    pub master_id: Option<IngredientId>,
}

impl Ingredient {
    pub fn new(id: IngredientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cas: None,
            pumps: PumpConfig::default(),
            stock_g: 0.0,
            master_id: None,
        }
    }

    pub fn with_large(mut self, out: PumpOutput) -> Self {
        self.pumps.large = out;
        self
    }

    pub fn with_small(mut self, out: PumpOutput) -> Self {
        self.pumps.small = out;
        self
    }

    pub fn with_threshold(mut self, grams: f64) -> Self {
        self.pumps.threshold_g = Some(grams);
        self
    }

    pub fn with_stock(mut self, grams: f64) -> Self {
        self.stock_g = grams;
        self
    }

    pub fn delegating_to(mut self, master: IngredientId) -> Self {
        self.master_id = Some(master);
        self
    }
}

/// An ingredient line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredient {
    pub ingredient_id: IngredientId,
    /// Pulse duration at the recipe's reference batch size.
    pub reference_duration_ms: Option<u32>,
    pub sequence_order: u32,
    /// Default selection state offered to the operator.
    pub selected: bool,
}

impl RecipeIngredient {
    pub fn new(ingredient_id: IngredientId, reference_duration_ms: u32, sequence_order: u32) -> Self {
        Self {
            ingredient_id,
            reference_duration_ms: Some(reference_duration_ms),
            sequence_order,
            selected: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub reference_batch_g: f64,
    pub items: Vec<RecipeIngredient>,
}

impl Recipe {
    /// Items in pumping order (stable for equal `sequence_order`).
    pub fn ordered_items(&self) -> Vec<&RecipeIngredient> {
        let mut items: Vec<&RecipeIngredient> = self.items.iter().collect();
        items.sort_by_key(|ri| ri.sequence_order);
        items
    }
}

/// Human label for a pin: analog pins render as `A0`..`A15`.
pub fn pin_label(pin: u8) -> String {
    if (ANALOG_PIN_BASE..ANALOG_PIN_BASE + ANALOG_PIN_COUNT).contains(&pin) {
        format!("A{}", pin - ANALOG_PIN_BASE)
    } else {
        pin.to_string()
    }
}

/// Parse `"22"` or `"A3"` into a pin number.
pub fn parse_pin(s: &str) -> Option<u8> {
    let t = s.trim();
    if let Some(rest) = t.strip_prefix('A').or_else(|| t.strip_prefix('a')) {
        let n: u8 = rest.parse().ok()?;
        return (n < ANALOG_PIN_COUNT).then(|| ANALOG_PIN_BASE + n);
    }
    t.parse().ok()
}
