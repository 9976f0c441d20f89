#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Recipe execution scheduler (hardware-agnostic).
//!
//! Turns a recipe bound to a reference batch size into a hardware-safe
//! actuation plan and carries it out over the two-phase batch protocol.
//! All link traffic goes through `mixer_traits::Transport`.
//!
//! ## Pipeline
//!
//! - **Conversion**: grams / percentage / pulse duration (`converter`)
//! - **Selection**: which pump of an ingredient fires, and for how long (`selector`)
//! - **Planning**: one actuation request per selected ingredient (`plan`)
//! - **Chunking**: split pulses longer than the per-command ceiling (`chunker`)
//! - **Batching**: group by node, bounded entries per `batchprep` (`batcher`)
//! - **Estimation**: sequential / parallel run time (`estimator`)
//! - **Stock**: pre-flight availability and post-run debit (`ledger`)
//! - **Execution**: sequential or synchronized parallel runs (`engine`)

pub mod audit;
pub mod batcher;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod conversions;
pub mod converter;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod format;
pub mod hw_error;
pub mod ledger;
pub mod model;
pub mod plan;
pub mod protocol;
pub mod selector;
pub mod status;
pub mod store;

pub use audit::{AuditFinding, audit};
pub use catalog::{Catalog, Inventory, ResolvedIngredient, resolve};
pub use config::{ExecutionLimits, PinRules};
pub use engine::{Engine, Preflight, RunHandle, RunRequest, StopSignal, preflight};
pub use error::{ConfigurationError, ConversionError, EngineError, Stage, TransmissionError};
pub use estimator::Estimate;
pub use hw_error::LinkFault;
pub use ledger::{Availability, Consumption, Shortfall};
pub use model::{Ingredient, NodeUid, PumpConfig, PumpKind, PumpOutput, Recipe, RecipeIngredient};
pub use plan::{ActuationRequest, Plan, Selection, build_plan};
pub use status::{EngineState, ExecutionEvent, ExecutionMode, RunOutcome, StepReport};
pub use store::FileInventory;
