use crate::hw_error::LinkFault;
use crate::model::{IngredientId, NodeUid};
use std::fmt;
use thiserror::Error;

/// Invalid input to a quantity conversion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(f64),
    #[error("batch size must be positive, got {0} g")]
    NonPositiveBatch(f64),
    #[error("grams must be non-negative, got {0}")]
    NegativeGrams(f64),
    #[error("duration must be non-negative, got {0} ms")]
    NegativeDuration(f64),
    #[error("ms per gram must be positive, got {0}")]
    NonPositiveRate(f64),
}

/// Data problem detected before anything is sent; fixed by editing the inventory.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{name}: no pulse duration configured")]
    MissingDuration { ingredient: IngredientId, name: String },
    #[error("{name}: no pump pin/uid configured")]
    NoPump { ingredient: IngredientId, name: String },
    #[error("ingredient {0} not found")]
    UnknownIngredient(IngredientId),
    #[error("{name}: master ingredient {master} not found")]
    DanglingMaster {
        ingredient: IngredientId,
        name: String,
        master: IngredientId,
    },
    #[error("{name}: master ingredient chain loops back on itself")]
    MasterCycle { ingredient: IngredientId, name: String },
    #[error("ingredient {ingredient}: invalid node uid {uid:?}")]
    InvalidUid { ingredient: IngredientId, uid: String },
    #[error("recipe {0}: reference batch size must be positive")]
    InvalidReferenceBatch(String),
    #[error("desired quantity must be positive, got {0} g")]
    InvalidDesiredQuantity(f64),
    #[error("no ingredient selected")]
    NothingSelected,
}

impl ConfigurationError {
    /// Ingredient the problem is attached to, if any.
    pub fn ingredient(&self) -> Option<IngredientId> {
        match self {
            Self::MissingDuration { ingredient, .. }
            | Self::NoPump { ingredient, .. }
            | Self::DanglingMaster { ingredient, .. }
            | Self::MasterCycle { ingredient, .. }
            | Self::InvalidUid { ingredient, .. } => Some(*ingredient),
            Self::UnknownIngredient(id) => Some(*id),
            _ => None,
        }
    }
}

/// Protocol step during which a send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The `batchabort` that clears stale state before a run.
    Clear,
    /// A `batchprep` line.
    Prepare,
    /// The `batchrun` trigger.
    Trigger,
    /// A manual `pulse`.
    Pulse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Clear => "clear",
            Stage::Prepare => "prepare",
            Stage::Trigger => "trigger",
            Stage::Pulse => "pulse",
        })
    }
}

/// A command could not be transmitted; the run was aborted.
#[derive(Debug, Error, Clone, PartialEq)]
pub struct TransmissionError {
    pub stage: Stage,
    pub node: Option<NodeUid>,
    pub ingredient: Option<String>,
    pub fault: LinkFault,
}

impl fmt::Display for TransmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.stage)?;
        if let Some(node) = self.node {
            write!(f, " for node {node}")?;
        }
        if let Some(name) = &self.ingredient {
            write!(f, " ({name})")?;
        }
        write!(f, ": {}", self.fault)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a run is already active")]
    Busy,
    #[error("transport is not connected")]
    NotConnected,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Transmission(#[from] TransmissionError),
    #[error("pulse of {requested_ms} ms exceeds the {max_ms} ms ceiling")]
    PulseTooLong { requested_ms: u64, max_ms: u64 },
    #[error("failed to spawn run worker: {0}")]
    Spawn(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
