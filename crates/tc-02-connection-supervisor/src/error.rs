//! Supervisor error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("Name <{name}> is already registered")]
    NameTaken { name: String },

    /// Startup failure: the connection name could not be claimed.
    #[error("Registration of connection <{connection_id}> failed after {attempts} attempts")]
    RegistrationFailed { connection_id: String, attempts: u32 },

    /// Too many consecutive abnormal terminations.
    #[error("Connection <{connection_id}> gave up after {failures} consecutive failures")]
    RestartsExhausted { connection_id: String, failures: u32 },

    #[error("Invalid supervisor configuration: {0}")]
    InvalidConfig(String),
}

/// Abnormal termination of a connection worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("Failed to connect to <{uri}>: {reason}")]
    Connect { uri: String, reason: String },

    #[error("Connection lost: {0}")]
    Disconnected(String),

    #[error("Dispatcher is gone")]
    DispatcherClosed,

    #[error("Unsupported connection type <{0}>")]
    UnsupportedType(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
