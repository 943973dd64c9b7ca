//! Supervisor configuration.

use crate::domain::backoff::BackoffPolicy;
use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(with = "shared_types::duration_serde")]
    pub min_backoff: Duration,
    #[serde(with = "shared_types::duration_serde")]
    pub max_backoff: Duration,
    /// Jitter factor, within `[0, 1]`.
    pub random_factor: f64,
    /// Attempts to claim the connection name before startup fails.
    pub registration_max_attempts: u32,
    #[serde(with = "shared_types::duration_serde")]
    pub registration_delay: Duration,
    /// Consecutive abnormal terminations tolerated before giving up.
    pub max_restarts: u32,
    /// A worker up for at least this long resets the failure count.
    /// Defaults to `max_backoff`.
    #[serde(default, with = "optional_duration", skip_serializing_if = "Option::is_none")]
    pub reset_after: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            random_factor: 1.0,
            registration_max_attempts: 5,
            registration_delay: Duration::from_secs(1),
            max_restarts: 10,
            reset_after: None,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.min_backoff.is_zero() {
            return Err(SupervisorError::InvalidConfig("min_backoff must be > 0".into()));
        }
        if self.max_backoff < self.min_backoff {
            return Err(SupervisorError::InvalidConfig(
                "max_backoff must be >= min_backoff".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.random_factor) {
            return Err(SupervisorError::InvalidConfig(
                "random_factor must be within [0, 1]".into(),
            ));
        }
        if self.registration_max_attempts == 0 {
            return Err(SupervisorError::InvalidConfig(
                "registration_max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.min_backoff, self.max_backoff, self.random_factor)
    }

    pub fn reset_after(&self) -> Duration {
        self.reset_after.unwrap_or(self.max_backoff)
    }
}

mod optional_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => shared_types::duration_serde::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| shared_types::duration_serde::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
