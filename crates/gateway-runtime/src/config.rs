//! # Gateway Configuration
//!
//! Loaded from an optional TOML file named by `TC_CONFIG`, then overridden
//! from the environment.
//!
//! ```toml
//! [streaming]
//! port = 8080
//!
//! [supervisor]
//! min_backoff = "1s"
//! max_backoff = "5s"
//!
//! [[connections]]
//! id = "sensors"
//! connection_type = "tcp"
//! uri = "127.0.0.1:7000"
//! authorization_subjects = ["integration:sensors"]
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TC_STREAMING_HOST` | `streaming.host` |
//! | `TC_STREAMING_PORT` | `streaming.port` |
//! | `TC_MIN_BACKOFF` | `supervisor.min_backoff` |
//! | `TC_MAX_BACKOFF` | `supervisor.max_backoff` |
//! | `TC_INBOX_CAPACITY` | `dispatch.inbox_capacity` |

use serde::{Deserialize, Serialize};
use shared_types::duration_serde::parse_duration;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tc_01_message_mapping::DispatchConfig;
use tc_02_connection_supervisor::{Connection, SupervisorConfig};
use tc_03_streaming_gateway::StreamingConfig;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "TC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value <{value}> for {key}: {reason}")]
    Override {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub streaming: StreamingConfig,
    pub supervisor: SupervisorConfig,
    pub dispatch: DispatchConfig,
    pub connections: Vec<Connection>,
}

impl GatewayConfig {
    /// File named by `TC_CONFIG` (defaults if unset), then the process
    /// environment, then validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TC_STREAMING_HOST") {
            self.streaming.host = host;
        }
        if let Some(port) = lookup("TC_STREAMING_PORT") {
            self.streaming.port = parse_number("TC_STREAMING_PORT", &port)?;
        }
        if let Some(value) = lookup("TC_MIN_BACKOFF") {
            self.supervisor.min_backoff = parse_override_duration("TC_MIN_BACKOFF", &value)?;
        }
        if let Some(value) = lookup("TC_MAX_BACKOFF") {
            self.supervisor.max_backoff = parse_override_duration("TC_MAX_BACKOFF", &value)?;
        }
        if let Some(value) = lookup("TC_INBOX_CAPACITY") {
            self.dispatch.inbox_capacity = parse_number("TC_INBOX_CAPACITY", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.streaming
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.supervisor
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.dispatch
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        for connection in &self.connections {
            if connection.id.trim().is_empty() {
                return Err(ConfigError::Invalid("connection id must not be empty".into()));
            }
            if !seen.insert(connection.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connection id <{}>",
                    connection.id
                )));
            }
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_override_duration(key: &str, value: &str) -> Result<std::time::Duration, ConfigError> {
    parse_duration(value).map_err(|reason| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}
