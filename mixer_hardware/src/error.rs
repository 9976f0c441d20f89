use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("link disconnected")]
    Disconnected,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("command rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
