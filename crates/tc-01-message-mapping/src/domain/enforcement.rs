//! # Enforcement Filter
//!
//! Binds an inbound message to the entity it may address. The filter's
//! template is resolved against what the transport saw (the message headers
//! or the source address), never against headers carried inside the payload,
//! and must equal the signal id exactly. A mismatch is a security failure and
//! is never retried.

use crate::domain::placeholder::{resolve_strict, HeadersPlaceholder, SourceAddressPlaceholder};
use crate::error::{MappingError, MappingResult};
use serde::{Deserialize, Serialize};
use shared_types::{DittoHeaders, Signal};

/// Where the filter template takes its values from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementInput {
    /// `{{ header:* }}` against the transport headers of the message.
    MessageHeaders,
    /// `{{ source:address }}` against the address the message came from.
    SourceAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementFilter {
    connection_id: String,
    pattern: String,
    input: EnforcementInput,
}

impl EnforcementFilter {
    pub fn new(connection_id: impl Into<String>, pattern: impl Into<String>, input: EnforcementInput) -> Self {
        Self {
            connection_id: connection_id.into(),
            pattern: pattern.into(),
            input,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn input(&self) -> &EnforcementInput {
        &self.input
    }

    /// Succeeds iff the resolved pattern equals the id of `signal`.
    ///
    /// `message_headers` are the headers the transport delivered, before
    /// protocol mapping merged anything from the payload. A pattern that
    /// cannot be fully resolved fails like a mismatch.
    pub fn matches(&self, signal: &Signal, message_headers: &DittoHeaders) -> MappingResult<()> {
        let signal_id = signal.entity_id().unwrap_or_default();
        let resolved = match &self.input {
            EnforcementInput::MessageHeaders => {
                resolve_strict(&self.pattern, message_headers, &HeadersPlaceholder)
            }
            EnforcementInput::SourceAddress(address) => {
                resolve_strict(&self.pattern, address.as_str(), &SourceAddressPlaceholder)
            }
        };

        match resolved {
            Ok(expected) if expected == signal_id => Ok(()),
            _ => Err(self.mismatch(signal_id, signal.headers())),
        }
    }

    /// The error is addressed with the signal's headers so the reply keeps
    /// its correlation id.
    fn mismatch(&self, actual: &str, signal_headers: &DittoHeaders) -> MappingError {
        let mut headers = signal_headers.to_builder();
        if !actual.is_empty() {
            headers = headers.thing_id(actual);
        }
        MappingError::EnforcementFailed {
            connection_id: self.connection_id.clone(),
            pattern: self.pattern.clone(),
            actual: actual.to_string(),
            headers: headers.build(),
        }
    }
}
