#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, inventory file format and calibration parsing for the mixer.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `InventoryFile` is the on-disk form of ingredients (pump wiring, stock)
//!   and recipes; it round-trips through TOML so stock debits can be persisted.
//! - The calibration CSV loader enforces headers and rejects duplicate or
//!   non-positive rates.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod inventory;

pub use inventory::{IngredientEntry, InventoryFile, PumpEntry, RecipeEntry, RecipeItemEntry};

/// Pins reserved by the controller firmware (serial, I2C, SPI, status LED).
pub const DEFAULT_RESTRICTED_PINS: [u8; 10] = [0, 1, 2, 13, 20, 21, 50, 51, 52, 53];

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SerialCfg {
    /// Device node of the master controller (e.g. /dev/ttyUSB0). When absent the
    /// CLI refuses hardware runs and only `--simulate` is available.
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutionCfg {
    /// Longest pulse a single command may carry (ms).
    pub max_segment_ms: u64,
    /// Maximum pin/duration pairs in one `batchprep` line.
    pub max_batch_size: usize,
    /// Settling margin after each sequential segment (ms).
    pub sequential_settle_ms: u64,
    /// Extra wait after the parallel trigger (ms).
    pub parallel_margin_ms: u64,
    /// Pause after each `batchprep` before the next line (ms).
    pub inter_command_delay_ms: u64,
    /// Bootstrap conversion rate used when no pump is calibrated.
    pub default_ms_per_gram: u32,
    /// Pump switch-over threshold for ingredients that do not set one.
    pub default_threshold_g: f64,
}

impl Default for ExecutionCfg {
    fn default() -> Self {
        Self {
            max_segment_ms: 60_000,
            max_batch_size: 64,
            sequential_settle_ms: 200,
            parallel_margin_ms: 500,
            inter_command_delay_ms: 50,
            default_ms_per_gram: 20,
            default_threshold_g: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PinsCfg {
    /// Highest addressable pin on a node (A15 on a Mega is 69).
    pub max_pin: u8,
    /// Pins that must never drive a pump.
    pub restricted: Vec<u8>,
    /// Upper bound of wired pumps per node UID.
    pub max_pins_per_uid: usize,
}

impl Default for PinsCfg {
    fn default() -> Self {
        Self {
            max_pin: 69,
            restricted: DEFAULT_RESTRICTED_PINS.to_vec(),
            max_pins_per_uid: 60,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialCfg,
    #[serde(default)]
    pub execution: ExecutionCfg,
    #[serde(default)]
    pub pins: PinsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let ex = &self.execution;
        if ex.max_segment_ms == 0 || ex.max_segment_ms > 60_000 {
            eyre::bail!("execution.max_segment_ms must be in [1, 60000]");
        }
        if ex.max_batch_size == 0 || ex.max_batch_size > 64 {
            eyre::bail!("execution.max_batch_size must be in [1, 64]");
        }
        if ex.sequential_settle_ms > 10_000 {
            eyre::bail!("execution.sequential_settle_ms is unreasonably large (>10s)");
        }
        if ex.parallel_margin_ms > 60_000 {
            eyre::bail!("execution.parallel_margin_ms is unreasonably large (>60s)");
        }
        if ex.inter_command_delay_ms > 5_000 {
            eyre::bail!("execution.inter_command_delay_ms is unreasonably large (>5s)");
        }
        if ex.default_ms_per_gram == 0 {
            eyre::bail!("execution.default_ms_per_gram must be > 0");
        }
        if !(ex.default_threshold_g.is_finite() && ex.default_threshold_g > 0.0) {
            eyre::bail!("execution.default_threshold_g must be > 0");
        }

        if self.pins.max_pins_per_uid == 0 {
            eyre::bail!("pins.max_pins_per_uid must be >= 1");
        }
        if let Some(p) = self.pins.restricted.iter().find(|p| **p > self.pins.max_pin) {
            eyre::bail!("pins.restricted contains {p}, above pins.max_pin");
        }

        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}

/// Which physical pump of an ingredient a calibration row refers to.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PumpSide {
    Large,
    Small,
}

/// Calibration CSV schema.
///
/// Expected headers:
/// ingredient,pump,ms_per_gram
///
/// Example:
/// ingredient,pump,ms_per_gram
/// 1,large,18
/// 1,small,42
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRow {
    pub ingredient: u64,
    pub pump: PumpSide,
    pub ms_per_gram: u32,
}

/// Parse calibration rows from any reader (headers required).
pub fn read_calibration_csv<R: std::io::Read>(reader: R) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {e}"))?
        .clone();
    let expected = ["ingredient", "pump", "ms_per_gram"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'ingredient,pump,ms_per_gram', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.ms_per_gram == 0 {
            eyre::bail!("invalid CSV row {}: ms_per_gram must be > 0", idx + 2);
        }
        if !seen.insert((row.ingredient, row.pump)) {
            eyre::bail!(
                "invalid CSV row {}: duplicate calibration for ingredient {} ({:?} pump)",
                idx + 2,
                row.ingredient,
                row.pump
            );
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<CalibrationRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {path:?}: {e}"))?;
    read_calibration_csv(file).map_err(|e| e.wrap_err(format!("calibration CSV {path:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_hardware_defaults() {
        let cfg = load_toml("").expect("parse");
        assert_eq!(cfg.execution.max_segment_ms, 60_000);
        assert_eq!(cfg.execution.max_batch_size, 64);
        assert_eq!(cfg.execution.sequential_settle_ms, 200);
        assert_eq!(cfg.execution.parallel_margin_ms, 500);
        assert_eq!(cfg.execution.default_ms_per_gram, 20);
        assert_eq!(cfg.pins.restricted, DEFAULT_RESTRICTED_PINS.to_vec());
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn calibration_rejects_zero_rate() {
        let csv = "ingredient,pump,ms_per_gram\n1,large,0\n";
        let err = read_calibration_csv(csv.as_bytes()).expect_err("zero rate");
        assert!(err.to_string().contains("ms_per_gram must be > 0"));
    }
}
