//! Default mapping processor: the payload is a protocol envelope.
//!
//! Inbound, the external headers are merged under the envelope headers, so
//! the envelope wins on conflicts. Outbound, the signal is rendered as
//! envelope text tagged with the envelope content type.

use crate::domain::external::{ExternalMessage, Payload};
use crate::error::{MappingError, MappingResult};
use crate::ports::outbound::{InboundExternalMessage, MessageMappingProcessor};
use shared_types::envelope::{Criterion, CONTENT_TYPE};
use shared_types::errors::{codes, status};
use shared_types::{
    keys, Channel, DefaultProtocolAdapter, ProtocolAdapter, ProtocolEnvelope, Signal,
    SignalException, TopicPath,
};
use std::sync::Arc;
use tracing::trace;

pub struct ProtocolMappingProcessor {
    adapter: Arc<dyn ProtocolAdapter>,
    /// `None` lets every criterion through.
    criteria: Option<Vec<Criterion>>,
}

impl ProtocolMappingProcessor {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>) -> Self {
        Self {
            adapter,
            criteria: None,
        }
    }

    /// Only map signals of the given criteria. Responses and errors always
    /// pass outbound since they answer something the far end sent.
    pub fn with_criteria(mut self, criteria: Vec<Criterion>) -> Self {
        self.criteria = Some(criteria);
        self
    }

    fn allows(&self, criterion: Criterion) -> bool {
        self.criteria
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&criterion))
    }
}

impl Default for ProtocolMappingProcessor {
    fn default() -> Self {
        Self::new(Arc::new(DefaultProtocolAdapter))
    }
}

impl MessageMappingProcessor for ProtocolMappingProcessor {
    fn process_inbound(&self, message: &ExternalMessage) -> MappingResult<Option<InboundExternalMessage>> {
        let text = match message.payload() {
            Payload::Empty => return Ok(None),
            Payload::Text(text) => text.as_str(),
            Payload::Bytes(bytes) => std::str::from_utf8(bytes).map_err(|e| {
                MappingError::Domain(SignalException::new(
                    codes::UNSUPPORTED_CONTENT,
                    status::BAD_REQUEST,
                    format!("Binary payload is not valid UTF-8: {e}"),
                ))
            })?,
        };

        let mut envelope = ProtocolEnvelope::from_json_str(text)?;
        let topic = TopicPath::parse(&envelope.topic)?;
        if !self.allows(topic.criterion) {
            trace!(topic = %topic, "Inbound criterion not mapped");
            return Ok(None);
        }

        envelope.headers = message
            .ditto_headers()
            .to_builder()
            .put_headers(&envelope.headers)
            .build();
        let signal = self.adapter.from_envelope(envelope)?;

        Ok(Some(InboundExternalMessage {
            signal,
            topic_path: Some(topic),
            source: message.clone(),
        }))
    }

    fn process_outbound(&self, signal: &Signal) -> MappingResult<Option<ExternalMessage>> {
        let channel = signal.headers().channel().unwrap_or(if signal.is_live() {
            Channel::Live
        } else {
            Channel::Twin
        });
        let topic = self.adapter.topic_path(signal, channel);
        if !signal.is_response() && !self.allows(topic.criterion) {
            trace!(topic = %topic, "Outbound criterion not mapped");
            return Ok(None);
        }

        let envelope = self.adapter.to_envelope(signal, channel);
        let message = ExternalMessage::builder()
            .headers(signal.headers().iter())
            .header(keys::CONTENT_TYPE, CONTENT_TYPE)
            .text(envelope.to_json_string())
            .build();
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{DittoHeaders, SignalKind};

    const MODIFY: &str = r#"{"topic":"ditto/thing/things/twin/commands/modify","headers":{"correlation-id":"c-1"},"path":"/attributes/a","value":1}"#;

    #[test]
    fn test_inbound_envelope_headers_win() {
        let message = ExternalMessage::builder()
            .header("correlation-id", "transport")
            .header("device_id", "device-1")
            .text(MODIFY)
            .build();
        let inbound = ProtocolMappingProcessor::default()
            .process_inbound(&message)
            .unwrap()
            .unwrap();
        assert_eq!(inbound.signal.correlation_id(), Some("c-1"));
        assert_eq!(inbound.signal.headers().get("device_id"), Some("device-1"));
        assert_eq!(inbound.topic_path.unwrap().action.as_deref(), Some("modify"));
    }

    #[test]
    fn test_empty_payload_yields_no_signal() {
        let message = ExternalMessage::builder().build();
        assert_eq!(
            ProtocolMappingProcessor::default().process_inbound(&message),
            Ok(None)
        );
    }

    #[test]
    fn test_bytes_payload_is_decoded() {
        let message = ExternalMessage::builder().bytes(MODIFY.as_bytes().to_vec()).build();
        let inbound = ProtocolMappingProcessor::default()
            .process_inbound(&message)
            .unwrap();
        assert!(inbound.is_some());

        let binary = ExternalMessage::builder().bytes(vec![0xff, 0xfe]).build();
        let err = ProtocolMappingProcessor::default()
            .process_inbound(&binary)
            .unwrap_err();
        assert_eq!(err.to_exception().unwrap().error_code, codes::UNSUPPORTED_CONTENT);
    }

    #[test]
    fn test_malformed_json_is_domain_error() {
        let message = ExternalMessage::builder().text("{oops").build();
        let err = ProtocolMappingProcessor::default()
            .process_inbound(&message)
            .unwrap_err();
        assert_eq!(err.to_exception().unwrap().error_code, codes::JSON_INVALID);
    }

    #[test]
    fn test_criteria_filter_inbound() {
        let processor = ProtocolMappingProcessor::default().with_criteria(vec![Criterion::Events]);
        let message = ExternalMessage::builder().text(MODIFY).build();
        assert_eq!(processor.process_inbound(&message), Ok(None));
    }

    #[test]
    fn test_outbound_renders_envelope_with_content_type() {
        let signal = Signal::command_response(
            "things.responses:modify",
            "ditto:thing",
            204,
            DittoHeaders::builder().correlation_id("c-1").build(),
        );
        let message = ProtocolMappingProcessor::default()
            .with_criteria(vec![Criterion::Events])
            .process_outbound(&signal)
            .unwrap()
            .unwrap();
        assert_eq!(message.find_header(keys::CONTENT_TYPE), Some(CONTENT_TYPE));
        let envelope = ProtocolEnvelope::from_json_str(message.text_payload().unwrap()).unwrap();
        assert_eq!(envelope.topic, "ditto/thing/things/twin/commands/modify");
        assert_eq!(envelope.status, Some(204));
    }

    #[test]
    fn test_outbound_filtered_command_is_none() {
        let signal = Signal::command("things.commands:modify", "ditto:thing", DittoHeaders::empty());
        let processor = ProtocolMappingProcessor::default().with_criteria(vec![Criterion::Events]);
        assert_eq!(processor.process_outbound(&signal), Ok(None));
    }

    #[test]
    fn test_outbound_live_channel() {
        let signal = Signal::event(
            "things.events:modified",
            "ditto:thing",
            DittoHeaders::builder().channel(Channel::Live).build(),
        );
        let message = ProtocolMappingProcessor::default()
            .process_outbound(&signal)
            .unwrap()
            .unwrap();
        let envelope = ProtocolEnvelope::from_json_str(message.text_payload().unwrap()).unwrap();
        assert_eq!(envelope.topic, "ditto/thing/things/live/events/modified");
        let decoded = DefaultProtocolAdapter.from_envelope(envelope).unwrap();
        assert_eq!(decoded.kind(), &SignalKind::Event);
    }
}
