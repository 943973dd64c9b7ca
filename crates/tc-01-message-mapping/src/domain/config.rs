//! Dispatch configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid dispatch configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded mailbox of each connection's dispatcher.
    pub inbox_capacity: usize,
    /// Open traces older than this are swept.
    #[serde(with = "shared_types::duration_serde")]
    pub trace_ttl: Duration,
    #[serde(with = "shared_types::duration_serde")]
    pub trace_sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
            trace_ttl: Duration::from_secs(120),
            trace_sweep_interval: Duration::from_secs(10),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("inbox_capacity must be > 0".into()));
        }
        if self.trace_ttl.is_zero() {
            return Err(ConfigError::Invalid("trace_ttl must be > 0".into()));
        }
        if self.trace_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "trace_sweep_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}
