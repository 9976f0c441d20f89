//! Seams between the recipe scheduler and the outside world.
//!
//! The scheduler never talks to a serial port directly: everything that
//! leaves the process goes through [`Transport`], and every wait goes through
//! [`Clock`] so tests can run a whole recipe in virtual time.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error returned across trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Half-duplex, line-oriented link to the controller nodes.
///
/// Implementations send one textual command per call. A returned error means
/// the command was not transmitted; there is no delivery acknowledgement.
pub trait Transport {
    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Transmit a single command line (without the trailing newline).
    fn send(&mut self, command: &str) -> Result<(), BoxError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&mut self, command: &str) -> Result<(), BoxError> {
        (**self).send(command)
    }
}
