//! Runtime limits for planning and execution.
//!
//! These are separate from the TOML-deserialized config in `mixer_config`;
//! see `conversions` for the bridge.

/// Per-command pulse ceiling accepted by the nodes.
pub const MAX_SEGMENT_MS: u64 = 60_000;
/// Maximum `pin:duration` pairs in one `batchprep`.
pub const MAX_BATCH_SIZE: usize = 64;
/// Rate used when no pump of an ingredient is calibrated.
pub const DEFAULT_MS_PER_GRAM: u32 = 20;
pub const DEFAULT_THRESHOLD_G: f64 = 10.0;
pub const SEQUENTIAL_SETTLE_MS: u64 = 200;
pub const PARALLEL_MARGIN_MS: u64 = 500;
pub const INTER_COMMAND_DELAY_MS: u64 = 50;

/// Hardware ceilings and fixed timing margins.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    /// Longest single pulse a node accepts; longer pulses are chunked.
    pub max_segment_ms: u64,
    /// Most entries in one `batchprep` line.
    pub max_batch_size: usize,
    /// Local wait added after every sequential segment.
    pub sequential_settle_ms: u64,
    /// Local wait added after the parallel trigger.
    pub parallel_margin_ms: u64,
    /// Pause after each `batchprep` so the node can parse it.
    pub inter_command_delay_ms: u64,
    pub default_ms_per_gram: u32,
    pub default_threshold_g: f64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_segment_ms: MAX_SEGMENT_MS,
            max_batch_size: MAX_BATCH_SIZE,
            sequential_settle_ms: SEQUENTIAL_SETTLE_MS,
            parallel_margin_ms: PARALLEL_MARGIN_MS,
            inter_command_delay_ms: INTER_COMMAND_DELAY_MS,
            default_ms_per_gram: DEFAULT_MS_PER_GRAM,
            default_threshold_g: DEFAULT_THRESHOLD_G,
        }
    }
}

impl ExecutionLimits {
    /// Ceilings clamped to at least one, so chunking and batching always progress.
    pub(crate) fn segment_ceiling(&self) -> u64 {
        self.max_segment_ms.max(1)
    }

    pub(crate) fn batch_ceiling(&self) -> usize {
        self.max_batch_size.max(1)
    }

    pub(crate) fn default_rate(&self) -> f64 {
        f64::from(self.default_ms_per_gram.max(1))
    }
}

/// Wiring rules checked by the catalog audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRules {
    pub max_pin: u8,
    /// Pins reserved by the node firmware (serial, LED, bus).
    pub restricted: Vec<u8>,
    pub max_pins_per_uid: usize,
}

impl Default for PinRules {
    fn default() -> Self {
        Self {
            max_pin: 69,
            restricted: vec![0, 1, 2, 13, 20, 21, 50, 51, 52, 53],
            max_pins_per_uid: 60,
        }
    }
}
