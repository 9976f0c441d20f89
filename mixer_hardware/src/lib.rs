//! Concrete transports for the controller-node link.

pub mod error;
pub mod line;
pub mod sim;

pub use error::TransportError;
pub use line::LineTransport;
pub use sim::SimulatedTransport;
