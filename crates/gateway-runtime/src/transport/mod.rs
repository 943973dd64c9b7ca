//! Transport workers, one per connection type.

pub mod tcp;

pub use tcp::TcpWorker;

use std::sync::Arc;
use tc_02_connection_supervisor::{ConnectionWorker, WorkerError};

/// Connection types this gateway can run.
pub const SUPPORTED_TYPES: &[&str] = &["tcp"];

pub fn worker_for(connection_type: &str) -> Result<Arc<dyn ConnectionWorker>, WorkerError> {
    match connection_type.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Arc::new(TcpWorker)),
        other => Err(WorkerError::UnsupportedType(other.to_string())),
    }
}
