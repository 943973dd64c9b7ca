//! Streaming endpoint configuration.

use crate::error::StreamingError;
use serde::{Deserialize, Serialize};
use shared_types::SchemaVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub host: String,
    pub port: u16,
    /// Bounded queue between a session's socket and the router.
    pub subscriber_backpressure_queue_size: usize,
    /// Bounded per-session buffer fed by the session hub.
    pub publisher_backpressure_buffer_size: usize,
    /// Upper bound for one reassembled text payload, in bytes.
    pub max_message_size: usize,
    pub supported_versions: Vec<u32>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            subscriber_backpressure_queue_size: 100,
            publisher_backpressure_buffer_size: 100,
            max_message_size: 1024 * 1024,
            supported_versions: vec![1, 2],
        }
    }
}

impl StreamingConfig {
    pub fn validate(&self) -> Result<(), StreamingError> {
        if self.subscriber_backpressure_queue_size == 0 {
            return Err(StreamingError::InvalidConfig(
                "subscriber_backpressure_queue_size must be > 0".into(),
            ));
        }
        if self.publisher_backpressure_buffer_size == 0 {
            return Err(StreamingError::InvalidConfig(
                "publisher_backpressure_buffer_size must be > 0".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(StreamingError::InvalidConfig(
                "max_message_size must be > 0".into(),
            ));
        }
        if self.supported_versions.is_empty() {
            return Err(StreamingError::InvalidConfig(
                "at least one schema version must be supported".into(),
            ));
        }
        if let Some(unknown) = self
            .supported_versions
            .iter()
            .find(|v| SchemaVersion::from_int(**v).is_none())
        {
            return Err(StreamingError::InvalidConfig(format!(
                "unknown schema version {unknown}"
            )));
        }
        Ok(())
    }

    /// The schema version named by a request path segment, if enabled.
    pub fn schema_version(&self, raw: &str) -> Option<SchemaVersion> {
        let version: u32 = raw.trim().parse().ok()?;
        if !self.supported_versions.contains(&version) {
            return None;
        }
        SchemaVersion::from_int(version)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
