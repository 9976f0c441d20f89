//! Run states, events streamed to the caller, and terminal outcomes.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigurationError, TransmissionError};
use crate::estimator::Estimate;
use crate::ledger::{Consumption, Shortfall};
use crate::model::{IngredientId, NodeUid, PumpKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    CheckingStock,
    /// Stock did not cover the plan; nothing was sent.
    AbortedStock,
    Preparing,
    Running,
    /// A send failed; `batchabort` is going out.
    Aborting,
    Completed,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Idle => "idle",
            EngineState::CheckingStock => "checking-stock",
            EngineState::AbortedStock => "aborted-stock",
            EngineState::Preparing => "preparing",
            EngineState::Running => "running",
            EngineState::Aborting => "aborting",
            EngineState::Completed => "completed",
            EngineState::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One segment at a time: prepare, trigger, wait.
    #[default]
    Sequential,
    /// Prepare every node, then fire them all with one trigger.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        })
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "parallel" | "par" => Ok(ExecutionMode::Parallel),
            other => Err(format!("unknown execution mode {other:?}")),
        }
    }
}

/// One segment handed to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub ingredient: IngredientId,
    /// Ingredient name, with the part number for split pulses.
    pub label: String,
    pub pump: PumpKind,
    pub node: NodeUid,
    pub pin: u8,
    pub duration_ms: u64,
    pub grams: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    State(EngineState),
    Log(String),
    Step(StepReport),
    /// Fraction in `[0, 1]`.
    Progress(f64),
    Estimate(Estimate),
    Finished(RunOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        consumed: Vec<Consumption>,
        /// Ingredients whose debit could not be persisted.
        ledger_errors: Vec<(IngredientId, String)>,
    },
    Stopped,
    StockBlocked(Vec<Shortfall>),
    SendFailed(TransmissionError),
    ConfigurationFailed(Vec<ConfigurationError>),
    /// The run worker died without reporting.
    Faulted(String),
}

impl RunOutcome {
    pub fn status_name(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Stopped => "stopped",
            RunOutcome::StockBlocked(_) => "stock-blocked",
            RunOutcome::SendFailed(_) => "send-failed",
            RunOutcome::ConfigurationFailed(_) => "configuration-error",
            RunOutcome::Faulted(_) => "faulted",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_loosely() {
        assert_eq!("Parallel".parse(), Ok(ExecutionMode::Parallel));
        assert_eq!(" seq ".parse(), Ok(ExecutionMode::Sequential));
        assert!("both".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn status_names_are_stable() {
        assert_eq!(RunOutcome::Stopped.status_name(), "stopped");
        assert_eq!(RunOutcome::StockBlocked(vec![]).status_name(), "stock-blocked");
    }
}
