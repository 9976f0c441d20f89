//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use mixer_core::{ExecutionMode, Selection};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "mixer", version, about = "Recipe execution for perfume pump nodes")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Inventory TOML (ingredients, pump wiring, stock, recipes)
    #[arg(long, value_name = "FILE", global = true)]
    pub inventory: Option<PathBuf>,

    /// Optional calibration CSV (strict header: ingredient,pump,ms_per_gram)
    #[arg(long, value_name = "FILE", global = true)]
    pub calibration: Option<PathBuf>,

    /// Output JSON (one object per line) instead of text
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides [logging] level, default warn
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Which recipe, how much, and which lines.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Recipe name (case-insensitive) or numeric id
    pub recipe: String,
    /// Desired output quantity in grams
    #[arg(long)]
    pub grams: f64,
    #[command(flatten)]
    pub lines: Lines,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Lines {
    /// Only these ingredient ids (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS", conflicts_with = "all")]
    pub only: Vec<u64>,
    /// Every recipe line, ignoring stored selection flags
    #[arg(long, action = ArgAction::SetTrue)]
    pub all: bool,
}

impl Lines {
    pub fn selection(&self) -> Selection {
        if self.all {
            Selection::All
        } else if self.only.is_empty() {
            Selection::AsRecipe
        } else {
            Selection::Only(self.only.iter().copied().collect::<BTreeSet<_>>())
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// One segment at a time
    #[default]
    Sequential,
    /// Prepare all nodes, single trigger
    Parallel,
}

impl From<Mode> for ExecutionMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Sequential => ExecutionMode::Sequential,
            Mode::Parallel => ExecutionMode::Parallel,
        }
    }
}

/// Where commands go.
#[derive(Args, Debug, Clone, Default)]
pub struct Link {
    /// Record commands in memory instead of writing to a device
    #[arg(long, action = ArgAction::SetTrue)]
    pub simulate: bool,
    /// Serial device; overrides [serial] device
    #[arg(long, value_name = "PATH", conflicts_with = "simulate")]
    pub device: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the actuation plan for a recipe at a batch size
    Plan(Target),
    /// Projected sequential and parallel run time
    Estimate(Target),
    /// Check stock against the scaled recipe
    CheckStock(Target),
    /// Largest batch the current stock can produce
    MaxBatch {
        /// Recipe name (case-insensitive) or numeric id
        recipe: String,
        #[command(flatten)]
        lines: Lines,
    },
    /// Execute a recipe
    Run {
        #[command(flatten)]
        target: Target,
        /// Execution mode
        #[arg(long, value_enum, default_value_t = Mode::Sequential)]
        mode: Mode,
        #[command(flatten)]
        link: Link,
    },
    /// Fire one pin once (calibration / manual test)
    Pulse {
        /// Slave address (decimal)
        #[arg(long)]
        slave: u32,
        /// Pin number or analog label (e.g. 22, A3)
        #[arg(long)]
        pin: String,
        /// Pulse duration in milliseconds
        #[arg(long)]
        ms: u64,
        #[command(flatten)]
        link: Link,
    },
    /// Report wiring problems in the inventory
    Audit,
    /// Validate config, inventory and calibration without touching hardware
    SelfCheck,
}
