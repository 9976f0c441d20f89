//! Human-readable error descriptions, exit codes and structured JSON errors.

use mixer_core::{ConfigurationError, EngineError, RunOutcome, TransmissionError};
use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_OTHER: i32 = 1;
pub const EXIT_STOCK: i32 = 3;
pub const EXIT_SEND_FAILED: i32 = 4;
pub const EXIT_STOPPED: i32 = 5;
pub const EXIT_CONFIG: i32 = 6;

/// Problems with the files and flags the CLI was given.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("config {path}: {reason}")]
    Config { path: String, reason: String },
    #[error("inventory {path}: {reason}")]
    Inventory { path: String, reason: String },
    #[error("calibration {path}: {reason}")]
    Calibration { path: String, reason: String },
    #[error("--inventory is required for this command")]
    MissingInventory,
    #[error("recipe {0:?} not found")]
    UnknownRecipe(String),
    #[error("invalid pin {0:?}")]
    InvalidPin(String),
    #[error("no serial device configured")]
    NoDevice,
}

pub fn exit_code_for_outcome(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed { .. } => EXIT_OK,
        RunOutcome::StockBlocked(_) => EXIT_STOCK,
        RunOutcome::SendFailed(_) => EXIT_SEND_FAILED,
        RunOutcome::Stopped => EXIT_STOPPED,
        RunOutcome::ConfigurationFailed(_) => EXIT_CONFIG,
        RunOutcome::Faulted(_) => EXIT_OTHER,
    }
}

/// Stable exit codes: 6 for configuration problems, 4 for link failures.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<SetupError>().is_some() || err.downcast_ref::<ConfigurationError>().is_some() {
        return EXIT_CONFIG;
    }
    if err.downcast_ref::<TransmissionError>().is_some() {
        return EXIT_SEND_FAILED;
    }
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Configuration(_) | EngineError::PulseTooLong { .. }) => EXIT_CONFIG,
        Some(EngineError::Transmission(_) | EngineError::NotConnected) => EXIT_SEND_FAILED,
        _ => EXIT_OTHER,
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<SetupError>() {
        return match se {
            SetupError::Config { path, reason } => format!(
                "What happened: The config file {path} is invalid ({reason}).\nLikely causes: A typo or an out-of-range value in [execution], [pins] or [logging].\nHow to fix: Edit the TOML and rerun `mixer self-check`."
            ),
            SetupError::Inventory { path, reason } => format!(
                "What happened: The inventory {path} could not be used ({reason}).\nLikely causes: Duplicate ids, a master_id or recipe line pointing at a missing ingredient, or a malformed node uid.\nHow to fix: Fix the inventory file and rerun `mixer self-check --inventory {path}`."
            ),
            SetupError::Calibration { path, reason } => format!(
                "What happened: The calibration CSV {path} was rejected ({reason}).\nLikely causes: Wrong header, a zero rate, or the same pump listed twice.\nHow to fix: Use the header 'ingredient,pump,ms_per_gram' with one row per pump."
            ),
            SetupError::MissingInventory => "What happened: This command needs ingredient and recipe data.\nLikely causes: --inventory was not given.\nHow to fix: Pass --inventory path/to/inventory.toml.".to_string(),
            SetupError::UnknownRecipe(name) => format!(
                "What happened: No recipe named or numbered {name:?}.\nLikely causes: A typo, or the recipe lives in another inventory file.\nHow to fix: Check the [[recipe]] entries of the inventory."
            ),
            SetupError::InvalidPin(pin) => format!(
                "What happened: {pin:?} is not a pin.\nLikely causes: Analog pins must be written A0..A15.\nHow to fix: Use a pin number (e.g. 22) or an analog label (e.g. A3)."
            ),
            SetupError::NoDevice => "What happened: No serial device to send commands to.\nLikely causes: [serial] device is not set and --device was not given.\nHow to fix: Set [serial] device, pass --device /dev/ttyUSB0, or use --simulate.".to_string(),
        };
    }

    if let Some(ce) = err.downcast_ref::<ConfigurationError>() {
        return format!(
            "What happened: {ce}.\nLikely causes: The recipe line or ingredient is incomplete.\nHow to fix: Set the missing duration or pump wiring in the inventory, or deselect the line with --only."
        );
    }

    if let Some(ee) = err.downcast_ref::<EngineError>() {
        return match ee {
            EngineError::NotConnected => "What happened: The link to the master node is down.\nLikely causes: Cable unplugged or device opened by another program.\nHow to fix: Reconnect the controller and retry.".to_string(),
            EngineError::Transmission(te) => format!(
                "What happened: {te}.\nLikely causes: The serial link dropped mid-command.\nHow to fix: Check the cable and retry; nothing was retried automatically."
            ),
            EngineError::Busy => "What happened: A run is already active.\nLikely causes: A previous command is still pumping.\nHow to fix: Wait for it to finish or stop it first.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        EXIT_CONFIG => "ConfigurationError",
        EXIT_SEND_FAILED => "SendFailed",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
