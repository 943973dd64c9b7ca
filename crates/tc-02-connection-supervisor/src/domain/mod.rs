//! Supervision domain: connection model, backoff and state machine.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod state;

pub use backoff::BackoffPolicy;
pub use config::SupervisorConfig;
pub use connection::{Connection, ConnectionStatus, EnforcementSettings, EnforcementSource};
pub use state::{SupervisionEvent, SupervisionState, SupervisionStateMachine};
