//! # Gateway Runtime Library
//!
//! Configuration, transports and wiring of the `twin-connect` binary,
//! exposed as a library for integration tests.

pub mod config;
pub mod transport;
pub mod wiring;

pub use config::{ConfigError, GatewayConfig, CONFIG_PATH_ENV};
pub use transport::{worker_for, TcpWorker};
pub use wiring::{ConnectionRoutes, GatewayRuntime};
