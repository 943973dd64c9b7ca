//! # External Message
//!
//! A message as it was consumed from (or is about to be published to) an
//! external transport, before it became a canonical signal.
//!
//! Messages are immutable. `with_*` methods return modified copies.

use crate::domain::enforcement::EnforcementFilter;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_types::{AuthorizationContext, DittoHeaders};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    Empty,
}

/// Content classification of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Text,
    Bytes,
    Unknown,
}

/// Declarative rewrite table: target header name to template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMapping {
    mapping: BTreeMap<String, String>,
}

impl HeaderMapping {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mapping: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapping.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalMessage {
    headers: BTreeMap<String, String>,
    payload: Payload,
    authorization_context: Option<AuthorizationContext>,
    enforcement_filter: Option<EnforcementFilter>,
    header_mapping: Option<HeaderMapping>,
    source_address: Option<String>,
}

impl ExternalMessage {
    pub fn builder() -> ExternalMessageBuilder {
        ExternalMessageBuilder::default()
    }

    pub fn to_builder(&self) -> ExternalMessageBuilder {
        ExternalMessageBuilder {
            message: self.clone(),
        }
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Transport headers as canonical headers.
    pub fn ditto_headers(&self) -> DittoHeaders {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn find_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Copy of this message with `key` set to `value`.
    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut message = self.clone();
        message.headers.insert(key.into(), value.into());
        message
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_type(&self) -> PayloadType {
        match self.payload {
            Payload::Text(_) => PayloadType::Text,
            Payload::Bytes(_) => PayloadType::Bytes,
            Payload::Empty => PayloadType::Unknown,
        }
    }

    pub fn text_payload(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes_payload(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn authorization_context(&self) -> Option<&AuthorizationContext> {
        self.authorization_context.as_ref()
    }

    pub fn enforcement_filter(&self) -> Option<&EnforcementFilter> {
        self.enforcement_filter.as_ref()
    }

    pub fn header_mapping(&self) -> Option<&HeaderMapping> {
        self.header_mapping.as_ref()
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ExternalMessageBuilder {
    message: ExternalMessage,
}

impl Default for ExternalMessageBuilder {
    fn default() -> Self {
        Self {
            message: ExternalMessage {
                headers: BTreeMap::new(),
                payload: Payload::Empty,
                authorization_context: None,
                enforcement_filter: None,
                header_mapping: None,
                source_address: None,
            },
        }
    }
}

impl ExternalMessageBuilder {
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.message.headers.insert(k.into(), v.into());
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.message.payload = Payload::Text(text.into());
        self
    }

    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.message.payload = Payload::Bytes(bytes.into());
        self
    }

    pub fn authorization_context(mut self, context: AuthorizationContext) -> Self {
        self.message.authorization_context = Some(context);
        self
    }

    pub fn enforcement_filter(mut self, filter: EnforcementFilter) -> Self {
        self.message.enforcement_filter = Some(filter);
        self
    }

    pub fn header_mapping(mut self, mapping: HeaderMapping) -> Self {
        self.message.header_mapping = Some(mapping);
        self
    }

    pub fn source_address(mut self, address: impl Into<String>) -> Self {
        self.message.source_address = Some(address.into());
        self
    }

    pub fn build(self) -> ExternalMessage {
        self.message
    }
}
