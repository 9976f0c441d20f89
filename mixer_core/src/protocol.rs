//! Text commands of the two-phase batch protocol.

use std::fmt;

use crate::batcher::TransmissionBatch;
use crate::model::NodeUid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stage `pin:duration` pairs on one node.
    BatchPrep { node: NodeUid, entries: Vec<(u8, u64)> },
    /// Fire every staged node.
    BatchRun,
    /// Drop staged state; safe at any time.
    BatchAbort,
    /// Immediate single pulse, outside batch mode. The slave is addressed in decimal.
    Pulse { slave: u32, pin: u8, duration_ms: u64 },
}

impl Command {
    pub fn prepare(batch: &TransmissionBatch) -> Self {
        Command::BatchPrep {
            node: batch.node,
            entries: batch.pairs(),
        }
    }

    pub fn pulse(slave: u32, pin: u8, duration_ms: u64) -> Self {
        Command::Pulse {
            slave,
            pin,
            duration_ms,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::BatchPrep { node, entries } => {
                write!(f, "batchprep {node}")?;
                for (pin, ms) in entries {
                    write!(f, " {pin}:{ms}")?;
                }
                Ok(())
            }
            Command::BatchRun => f.write_str("batchrun"),
            Command::BatchAbort => f.write_str("batchabort"),
            Command::Pulse {
                slave,
                pin,
                duration_ms,
            } => write!(f, "pulse {slave} {pin} {duration_ms}"),
        }
    }
}
