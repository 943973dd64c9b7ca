//! # TC-02 Connection Supervisor
//!
//! Owns the lifecycle of one external connection: exactly one worker
//! incarnation at a time, restarted after abnormal termination.
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!                    │     ConnectionSupervisor     │
//!                    │  (explicit state machine)    │
//!                    └───────┬───────────────┬──────┘
//!         register_with_retry│               │ run(WorkerContext)
//!                    ┌───────┴──────┐  ┌─────┴────────────┐
//!                    │   Registry   │  │ ConnectionWorker │ ──→ DispatchHandle
//!                    │ (name claims)│  │ (transport)      │ ←── outbound queue
//!                    └──────────────┘  └──────────────────┘
//! ```
//!
//! Two separate limits apply:
//!
//! - **Registration retry**: a restarted worker may collide with its own
//!   stale name. Claiming is retried `registration_max_attempts` times with a
//!   fixed delay; exhausting it fails connection startup.
//! - **Restart backoff**: crashes after startup are restarted with a
//!   jittered exponential backoff, escalating to `FailedTerminal` after
//!   `max_restarts` consecutive failures.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod registry;
pub mod service;

pub use domain::{
    BackoffPolicy, Connection, ConnectionStatus, EnforcementSettings, EnforcementSource,
    SupervisionState, SupervisorConfig,
};
pub use error::{SupervisorError, SupervisorResult, WorkerError};
pub use ports::{ConnectionWorker, WorkerContext};
pub use registry::{ConnectionRegistry, Registration};
pub use service::ConnectionSupervisor;
