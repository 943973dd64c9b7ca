//! Rendering of outbound items to text frames.

use super::control::StreamingAck;
use shared_types::signal::split_namespaced_id;
use shared_types::{Channel, DittoHeaders, ProtocolAdapter, Signal, SignalException};

/// Anything the hub pushes into a session's outbound buffer.
#[derive(Debug, Clone)]
pub enum OutboundItem {
    Signal(Signal),
    /// A fault raised while handling this session's own input.
    Error(SignalException),
    Ack(StreamingAck),
}

/// Explicit `channel` header, else `live` for live signals, else `twin`.
pub fn select_channel(headers: &DittoHeaders, live: bool) -> Channel {
    match headers.channel_value() {
        Some(value) => Channel::parse(value).unwrap_or(Channel::Twin),
        None if live => Channel::Live,
        None => Channel::Twin,
    }
}

pub fn render(item: &OutboundItem, adapter: &dyn ProtocolAdapter) -> String {
    match item {
        OutboundItem::Ack(ack) => ack.to_protocol_message(),
        OutboundItem::Signal(signal) => {
            let channel = select_channel(signal.headers(), signal.is_live());
            adapter.to_envelope(signal, channel).to_json_string()
        }
        OutboundItem::Error(error) => render_error(error, adapter),
    }
}

/// A fault becomes an error response. Its entity id comes from the
/// `thing-id` header when that is a valid namespaced id; otherwise the
/// envelope is rendered without an entity.
fn render_error(error: &SignalException, adapter: &dyn ProtocolAdapter) -> String {
    let channel = select_channel(&error.headers, false);
    let headers = error.headers.to_builder().channel(channel).build();
    let entity_id = headers
        .thing_id()
        .filter(|id| split_namespaced_id(id).is_some())
        .map(String::from);
    let response = Signal::error_response(
        error.clone().with_headers(headers.clone()),
        entity_id,
        headers,
    );
    adapter.to_envelope(&response, channel).to_json_string()
}
