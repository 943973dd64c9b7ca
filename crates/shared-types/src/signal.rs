//! # Canonical Signal
//!
//! A `Signal` is the transport-agnostic representation of a command, event or
//! response. The variant lives in [`SignalKind`]; everything else (type tag,
//! entity id, headers, resource path, payload) is common to all variants.
//!
//! Rendering to JSON is memoized in a one-time-write cell. The cell is never
//! part of equality and is reset whenever a new signal is derived via
//! [`Signal::with_headers`].

use crate::errors::SignalException;
use crate::headers::{Channel, DittoHeaders};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Type tag prefix of message commands. Messages always travel live.
pub const MESSAGES_PREFIX: &str = "messages.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    Command,
    Event,
    CommandResponse { status: u16 },
    ErrorResponse { error: SignalException },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    signal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_id: Option<String>,
    headers: DittoHeaders,
    #[serde(default = "root_path")]
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    kind: SignalKind,
    #[serde(skip)]
    rendered: OnceLock<String>,
}

fn root_path() -> String {
    "/".to_string()
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.signal_type == other.signal_type
            && self.entity_id == other.entity_id
            && self.headers == other.headers
            && self.path == other.path
            && self.payload == other.payload
            && self.kind == other.kind
    }
}

impl Signal {
    fn new(
        signal_type: impl Into<String>,
        entity_id: Option<String>,
        headers: DittoHeaders,
        kind: SignalKind,
    ) -> Self {
        Self {
            signal_type: signal_type.into(),
            entity_id,
            headers,
            path: root_path(),
            payload: None,
            kind,
            rendered: OnceLock::new(),
        }
    }

    pub fn command(
        signal_type: impl Into<String>,
        entity_id: impl Into<String>,
        headers: DittoHeaders,
    ) -> Self {
        Self::new(signal_type, Some(entity_id.into()), headers, SignalKind::Command)
    }

    pub fn event(
        signal_type: impl Into<String>,
        entity_id: impl Into<String>,
        headers: DittoHeaders,
    ) -> Self {
        Self::new(signal_type, Some(entity_id.into()), headers, SignalKind::Event)
    }

    pub fn command_response(
        signal_type: impl Into<String>,
        entity_id: impl Into<String>,
        status: u16,
        headers: DittoHeaders,
    ) -> Self {
        Self::new(
            signal_type,
            Some(entity_id.into()),
            headers,
            SignalKind::CommandResponse { status },
        )
    }

    /// Error response for `error`. Without an entity id the response is
    /// rendered as a headerless error envelope.
    pub fn error_response(
        error: SignalException,
        entity_id: Option<String>,
        headers: DittoHeaders,
    ) -> Self {
        Self::new(
            "things.errors",
            entity_id,
            headers,
            SignalKind::ErrorResponse { error },
        )
    }

    /// Attach a resource path and JSON value.
    pub fn with_payload(mut self, path: impl Into<String>, payload: Value) -> Self {
        self.path = path.into();
        self.payload = Some(payload);
        self.rendered = OnceLock::new();
        self
    }

    /// Copy of this signal carrying `headers`.
    pub fn with_headers(&self, headers: DittoHeaders) -> Self {
        Self {
            signal_type: self.signal_type.clone(),
            entity_id: self.entity_id.clone(),
            headers,
            path: self.path.clone(),
            payload: self.payload.clone(),
            kind: self.kind.clone(),
            rendered: OnceLock::new(),
        }
    }

    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn headers(&self) -> &DittoHeaders {
        &self.headers
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.headers.correlation_id()
    }

    /// Responses and error responses both complete a round trip.
    pub fn is_response(&self) -> bool {
        matches!(
            self.kind,
            SignalKind::CommandResponse { .. } | SignalKind::ErrorResponse { .. }
        )
    }

    pub fn is_error_response(&self) -> bool {
        matches!(self.kind, SignalKind::ErrorResponse { .. })
    }

    /// Message commands are inherently live; any other signal is live only
    /// when its `channel` header says so.
    pub fn is_live(&self) -> bool {
        self.signal_type.starts_with(MESSAGES_PREFIX)
            || self.headers.channel() == Some(Channel::Live)
    }

    /// Status code carried by responses.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            SignalKind::CommandResponse { status } => Some(*status),
            SignalKind::ErrorResponse { error } => Some(error.status),
            SignalKind::Command | SignalKind::Event => None,
        }
    }

    /// JSON rendering, computed once per signal value.
    pub fn to_json_string(&self) -> &str {
        self.rendered
            .get_or_init(|| serde_json::to_string(self).unwrap_or_default())
    }
}

/// Split a namespaced entity id (`namespace:name`) into its parts.
///
/// The namespace may be empty but must otherwise consist of dot separated
/// segments of alphanumerics, `_` or `-`. The name must be non-empty.
pub fn split_namespaced_id(id: &str) -> Option<(&str, &str)> {
    let (namespace, name) = id.split_once(':')?;
    let namespace_ok = namespace.is_empty()
        || namespace.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
    if !namespace_ok || name.is_empty() || name.chars().any(char::is_control) {
        return None;
    }
    Some((namespace, name))
}
