//! # Protocol Envelope
//!
//! The JSON wire form of a signal:
//!
//! ```text
//! {
//!   "topic":   "<namespace>/<name>/things/<twin|live>/<criterion>/<action>",
//!   "headers": { "correlation-id": "...", ... },
//!   "path":    "/attributes/location",
//!   "value":   { ... },
//!   "status":  204
//! }
//! ```
//!
//! [`ProtocolAdapter`] converts between envelopes and [`Signal`]s. The codec
//! is a seam: [`DefaultProtocolAdapter`] covers the things group and is what
//! the gateway ships with.

use crate::errors::SignalException;
use crate::headers::{Channel, DittoHeaders};
use crate::signal::{split_namespaced_id, Signal, SignalKind, MESSAGES_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Content type of envelope payloads.
pub const CONTENT_TYPE: &str = "application/vnd.eclipse.ditto+json";

/// Placeholder used in topics when the entity id is unknown.
const UNKNOWN_SEGMENT: &str = "_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
    pub topic: String,
    #[serde(default)]
    pub headers: DittoHeaders,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

fn root_path() -> String {
    "/".to_string()
}

impl ProtocolEnvelope {
    /// Parse an envelope from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SignalException> {
        serde_json::from_str(text).map_err(|e| SignalException::json_invalid(e.to_string()))
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    Commands,
    Events,
    Errors,
    Messages,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Commands => "commands",
            Criterion::Events => "events",
            Criterion::Errors => "errors",
            Criterion::Messages => "messages",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "commands" => Some(Criterion::Commands),
            "events" => Some(Criterion::Events),
            "errors" => Some(Criterion::Errors),
            "messages" => Some(Criterion::Messages),
            _ => None,
        }
    }
}

/// Parsed topic of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath {
    pub namespace: String,
    pub entity_name: String,
    pub group: String,
    pub channel: Channel,
    pub criterion: Criterion,
    /// Action for commands and events, message subject for messages, absent
    /// for errors.
    pub action: Option<String>,
}

impl TopicPath {
    pub fn parse(topic: &str) -> Result<Self, SignalException> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() < 5 {
            return Err(SignalException::topic_invalid(topic));
        }
        let channel =
            Channel::parse(segments[3]).ok_or_else(|| SignalException::topic_invalid(topic))?;
        let criterion =
            Criterion::parse(segments[4]).ok_or_else(|| SignalException::topic_invalid(topic))?;
        let action = match segments.get(5..) {
            Some(rest) if !rest.is_empty() => Some(rest.join("/")),
            _ => None,
        };
        if criterion != Criterion::Errors && action.is_none() {
            return Err(SignalException::topic_invalid(topic));
        }
        Ok(Self {
            namespace: segments[0].to_string(),
            entity_name: segments[1].to_string(),
            group: segments[2].to_string(),
            channel,
            criterion,
            action,
        })
    }

    /// The `namespace:name` entity id, `None` when the topic uses the
    /// unknown-entity placeholder.
    pub fn entity_id(&self) -> Option<String> {
        if self.namespace == UNKNOWN_SEGMENT && self.entity_name == UNKNOWN_SEGMENT {
            return None;
        }
        Some(format!("{}:{}", self.namespace, self.entity_name))
    }

    pub fn full(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.namespace,
            self.entity_name,
            self.group,
            self.channel,
            self.criterion.as_str()
        )?;
        if let Some(action) = &self.action {
            write!(f, "/{action}")?;
        }
        Ok(())
    }
}

/// Converts between protocol envelopes and canonical signals.
pub trait ProtocolAdapter: Send + Sync {
    fn from_envelope(&self, envelope: ProtocolEnvelope) -> Result<Signal, SignalException>;

    fn to_envelope(&self, signal: &Signal, channel: Channel) -> ProtocolEnvelope;

    fn topic_path(&self, signal: &Signal, channel: Channel) -> TopicPath;
}

/// Adapter for the `things` group.
///
/// Type tags take the form `things.commands:<action>`,
/// `things.responses:<action>`, `things.events:<action>` and
/// `messages.commands:<subject>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProtocolAdapter;

impl ProtocolAdapter for DefaultProtocolAdapter {
    fn from_envelope(&self, envelope: ProtocolEnvelope) -> Result<Signal, SignalException> {
        let topic = TopicPath::parse(&envelope.topic)?;
        let mut builder = envelope.headers.to_builder();
        if topic.channel == Channel::Live {
            builder = builder.channel(Channel::Live);
        }
        let headers = builder.build();
        let entity_id = topic.entity_id();
        let action = topic.action.clone().unwrap_or_default();

        let signal = match (topic.criterion, envelope.status) {
            (Criterion::Errors, _) => {
                let value = envelope
                    .value
                    .clone()
                    .ok_or_else(|| SignalException::json_invalid("error envelope without value"))?;
                let error: SignalException = serde_json::from_value(value)
                    .map_err(|e| SignalException::json_invalid(e.to_string()))?;
                return Ok(Signal::error_response(
                    error.with_headers(headers.clone()),
                    entity_id,
                    headers,
                ));
            }
            (Criterion::Events, _) => {
                Signal::event(format!("things.events:{action}"), require_id(entity_id, &topic)?, headers)
            }
            (Criterion::Commands, Some(status)) => Signal::command_response(
                format!("things.responses:{action}"),
                require_id(entity_id, &topic)?,
                status,
                headers,
            ),
            (Criterion::Commands, None) => {
                Signal::command(format!("things.commands:{action}"), require_id(entity_id, &topic)?, headers)
            }
            (Criterion::Messages, Some(status)) => Signal::command_response(
                format!("{MESSAGES_PREFIX}responses:{action}"),
                require_id(entity_id, &topic)?,
                status,
                headers,
            ),
            (Criterion::Messages, None) => Signal::command(
                format!("{MESSAGES_PREFIX}commands:{action}"),
                require_id(entity_id, &topic)?,
                headers,
            ),
        };

        Ok(match envelope.value {
            Some(value) => signal.with_payload(envelope.path, value),
            None => signal,
        })
    }

    fn to_envelope(&self, signal: &Signal, channel: Channel) -> ProtocolEnvelope {
        let topic = self.topic_path(signal, channel);
        let value = match signal.kind() {
            SignalKind::ErrorResponse { error } => serde_json::to_value(error).ok(),
            _ => signal.payload().cloned(),
        };
        ProtocolEnvelope {
            topic: topic.full(),
            headers: signal.headers().clone(),
            path: signal.path().to_string(),
            value,
            status: signal.status(),
        }
    }

    fn topic_path(&self, signal: &Signal, channel: Channel) -> TopicPath {
        let (namespace, entity_name) = signal
            .entity_id()
            .and_then(split_namespaced_id)
            .map(|(ns, name)| (ns.to_string(), name.to_string()))
            .unwrap_or_else(|| (UNKNOWN_SEGMENT.to_string(), UNKNOWN_SEGMENT.to_string()));

        let criterion = match signal.kind() {
            SignalKind::ErrorResponse { .. } => Criterion::Errors,
            SignalKind::Event => Criterion::Events,
            _ if signal.signal_type().starts_with(MESSAGES_PREFIX) => Criterion::Messages,
            _ => Criterion::Commands,
        };
        let action = match criterion {
            Criterion::Errors => None,
            _ => signal
                .signal_type()
                .split_once(':')
                .map(|(_, action)| action.to_string()),
        };

        TopicPath {
            namespace,
            entity_name,
            group: "things".to_string(),
            channel,
            criterion,
            action,
        }
    }
}

fn require_id(entity_id: Option<String>, topic: &TopicPath) -> Result<String, SignalException> {
    entity_id.ok_or_else(|| SignalException::topic_invalid(&topic.full()))
}
