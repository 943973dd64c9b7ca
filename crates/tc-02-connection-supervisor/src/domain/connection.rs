//! Connection model.

use serde::{Deserialize, Serialize};
use shared_types::AuthorizationContext;
use std::fmt;
use tc_01_message_mapping::{EnforcementFilter, EnforcementInput, HeaderMapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Open,
    Closed,
}

/// Where an enforcement filter takes its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementSource {
    #[default]
    Headers,
    SourceAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementSettings {
    /// Template that must resolve to the signal's entity id.
    pub filter: String,
    #[serde(default)]
    pub input: EnforcementSource,
}

/// One configured external connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub connection_type: String,
    pub uri: String,
    #[serde(default)]
    pub desired_status: ConnectionStatus,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub authorization_subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<EnforcementSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_mapping: Option<HeaderMapping>,
}

impl Connection {
    pub fn new(id: impl Into<String>, connection_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection_type: connection_type.into(),
            uri: uri.into(),
            desired_status: ConnectionStatus::Open,
            sources: Vec::new(),
            targets: Vec::new(),
            authorization_subjects: Vec::new(),
            enforcement: None,
            header_mapping: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.desired_status == ConnectionStatus::Open
    }

    pub fn authorization_context(&self) -> AuthorizationContext {
        AuthorizationContext::new(self.authorization_subjects.iter().map(String::as_str))
    }

    /// The enforcement filter for a message consumed from `source_address`.
    pub fn enforcement_filter(&self, source_address: &str) -> Option<EnforcementFilter> {
        self.enforcement.as_ref().map(|settings| {
            let input = match settings.input {
                EnforcementSource::Headers => EnforcementInput::MessageHeaders,
                EnforcementSource::SourceAddress => {
                    EnforcementInput::SourceAddress(source_address.to_string())
                }
            };
            EnforcementFilter::new(self.id.clone(), settings.filter.clone(), input)
        })
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.id, self.connection_type, self.uri)
    }
}
