//! Error types for the streaming gateway.

use shared_bus::RouterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamingError {
    #[error("Message of {size} bytes exceeds the limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Unsupported schema version <{0}>")]
    UnsupportedVersion(String),

    #[error("No authenticated subjects")]
    Unauthenticated,

    #[error("Session <{0}> is not connected")]
    SessionNotFound(String),

    #[error("Session <{0}> closed")]
    SessionClosed(String),

    #[error("Failed to write frame: {0}")]
    Send(String),

    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid streaming configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Router(#[from] RouterError),
}

pub type StreamingResult<T> = Result<T, StreamingError>;
