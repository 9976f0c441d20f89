//! Maps `Box<dyn Error>` from the transport boundary to a typed `LinkFault`.
//!
//! The traits in `mixer_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to a typed fault, with an
//! optional feature-gated path for `mixer_hardware::TransportError` downcasting.

use std::fmt;

/// Why a command did not reach the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFault {
    Disconnected,
    Timeout,
    Io(String),
    Other(String),
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFault::Disconnected => f.write_str("link disconnected"),
            LinkFault::Timeout => f.write_str("link write timed out"),
            LinkFault::Io(msg) => write!(f, "io error: {msg}"),
            LinkFault::Other(msg) => f.write_str(msg),
        }
    }
}

/// Map a trait-boundary error to a typed `LinkFault`.
///
/// Attempts to downcast known transport error types first, then falls back
/// to string-based heuristics.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> LinkFault {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(te) = e.downcast_ref::<mixer_hardware::error::TransportError>() {
            use mixer_hardware::error::TransportError;
            return match te {
                TransportError::Disconnected => LinkFault::Disconnected,
                TransportError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                    LinkFault::Timeout
                }
                TransportError::Io(io) => LinkFault::Io(io.to_string()),
                other => LinkFault::Other(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return match io.kind() {
            std::io::ErrorKind::TimedOut => LinkFault::Timeout,
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
                LinkFault::Disconnected
            }
            _ => LinkFault::Io(io.to_string()),
        };
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        LinkFault::Timeout
    } else if lower.contains("disconnected") || lower.contains("not connected") {
        LinkFault::Disconnected
    } else {
        LinkFault::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_faults() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(map_transport_error(&e), LinkFault::Disconnected);
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(map_transport_error(&e), LinkFault::Timeout);
    }

    #[test]
    fn unknown_errors_fall_back_to_message() {
        let e = std::fmt::Error;
        assert_eq!(
            map_transport_error(&e),
            LinkFault::Other("an error occurred when formatting an argument".into())
        );
    }
}
