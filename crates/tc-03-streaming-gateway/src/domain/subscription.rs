//! Per-session subscription state.
//!
//! Each of the four channels is an independent two-state machine,
//! `unsubscribed` initially. `START-*` and `STOP-*` are idempotent and
//! there is no terminal state.

use super::control::{ControlMessage, StreamingAck, StreamingType};
use shared_types::signal::{split_namespaced_id, MESSAGES_PREFIX};
use shared_types::{Signal, SignalKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub subscribed: bool,
    /// Empty means every namespace.
    pub namespaces: Vec<String>,
    /// Carried for the platform, not evaluated by the gateway.
    pub filter: Option<String>,
}

impl ChannelSubscription {
    fn accepts_namespace(&self, namespace: Option<&str>) -> bool {
        if self.namespaces.is_empty() {
            return true;
        }
        namespace.is_some_and(|ns| self.namespaces.iter().any(|n| n == ns))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    channels: [ChannelSubscription; 4],
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a control message; a repeated `START-*` replaces the
    /// parameters of the running subscription.
    pub fn apply(&mut self, control: &ControlMessage) -> StreamingAck {
        let channel = &mut self.channels[control.streaming_type().index()];
        *channel = match control {
            ControlMessage::Start {
                namespaces, filter, ..
            } => ChannelSubscription {
                subscribed: true,
                namespaces: namespaces.clone(),
                filter: filter.clone(),
            },
            ControlMessage::Stop { .. } => ChannelSubscription::default(),
        };
        StreamingAck::for_control(control)
    }

    pub fn channel(&self, streaming_type: StreamingType) -> &ChannelSubscription {
        &self.channels[streaming_type.index()]
    }

    pub fn is_subscribed(&self, streaming_type: StreamingType) -> bool {
        self.channel(streaming_type).subscribed
    }

    /// Whether `signal` should be pushed to this session.
    pub fn accepts(&self, signal: &Signal) -> bool {
        let Some(streaming_type) = streaming_type_of(signal) else {
            return false;
        };
        let channel = self.channel(streaming_type);
        let namespace = signal
            .entity_id()
            .and_then(split_namespaced_id)
            .map(|(ns, _)| ns);
        channel.subscribed && channel.accepts_namespace(namespace)
    }
}

/// The subscription channel a routed signal is delivered on. Responses are
/// addressed, not subscribed to, and twin commands never stream out.
pub fn streaming_type_of(signal: &Signal) -> Option<StreamingType> {
    match signal.kind() {
        SignalKind::Event if signal.is_live() => Some(StreamingType::LiveEvents),
        SignalKind::Event => Some(StreamingType::Events),
        SignalKind::Command if signal.signal_type().starts_with(MESSAGES_PREFIX) => {
            Some(StreamingType::Messages)
        }
        SignalKind::Command if signal.is_live() => Some(StreamingType::LiveCommands),
        SignalKind::Command
        | SignalKind::CommandResponse { .. }
        | SignalKind::ErrorResponse { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Channel, DittoHeaders};

    fn start(verb: &str) -> ControlMessage {
        ControlMessage::parse(verb).unwrap()
    }

    fn twin_event(id: &str) -> Signal {
        Signal::event("things.events:modified", id, DittoHeaders::empty())
    }

    fn live(headers: DittoHeaders) -> DittoHeaders {
        headers.to_builder().channel(Channel::Live).build()
    }

    #[test]
    fn test_initially_unsubscribed() {
        let state = SubscriptionState::new();
        for streaming_type in StreamingType::ALL {
            assert!(!state.is_subscribed(streaming_type));
        }
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let mut state = SubscriptionState::new();
        state.apply(&start("START-SEND-EVENTS"));
        state.apply(&start("START-SEND-EVENTS"));
        assert!(state.is_subscribed(StreamingType::Events));

        state.apply(&start("STOP-SEND-EVENTS"));
        state.apply(&start("STOP-SEND-EVENTS"));
        assert!(!state.is_subscribed(StreamingType::Events));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut state = SubscriptionState::new();
        state.apply(&start("START-SEND-LIVE-EVENTS"));
        state.apply(&start("STOP-SEND-EVENTS"));

        assert!(state.is_subscribed(StreamingType::LiveEvents));
        assert!(!state.is_subscribed(StreamingType::Events));
        assert!(!state.is_subscribed(StreamingType::Messages));
        assert!(!state.is_subscribed(StreamingType::LiveCommands));
    }

    #[test]
    fn test_restart_replaces_parameters() {
        let mut state = SubscriptionState::new();
        state.apply(&start("START-SEND-EVENTS?namespaces=a&filter=exists(x)"));
        state.apply(&start("START-SEND-EVENTS?namespaces=b"));

        let channel = state.channel(StreamingType::Events);
        assert_eq!(channel.namespaces, vec!["b".to_string()]);
        assert_eq!(channel.filter, None);
    }

    #[test]
    fn test_stop_clears_parameters() {
        let mut state = SubscriptionState::new();
        state.apply(&start("START-SEND-EVENTS?namespaces=a"));
        state.apply(&start("STOP-SEND-EVENTS"));
        assert_eq!(
            state.channel(StreamingType::Events),
            &ChannelSubscription::default()
        );
    }

    #[test]
    fn test_ack_follows_control() {
        let mut state = SubscriptionState::new();
        let ack = state.apply(&start("START-SEND-MESSAGES"));
        assert_eq!(ack.to_protocol_message(), "START-SEND-MESSAGES:ACK");
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            streaming_type_of(&twin_event("org.acme:lamp")),
            Some(StreamingType::Events)
        );

        let live_event = Signal::event(
            "things.events:modified",
            "org.acme:lamp",
            live(DittoHeaders::empty()),
        );
        assert_eq!(streaming_type_of(&live_event), Some(StreamingType::LiveEvents));

        let message = Signal::command("messages.commands:switch", "org.acme:lamp", DittoHeaders::empty());
        assert_eq!(streaming_type_of(&message), Some(StreamingType::Messages));

        let live_command = Signal::command(
            "things.commands:modify",
            "org.acme:lamp",
            live(DittoHeaders::empty()),
        );
        assert_eq!(streaming_type_of(&live_command), Some(StreamingType::LiveCommands));

        let twin_command = Signal::command("things.commands:modify", "org.acme:lamp", DittoHeaders::empty());
        assert_eq!(streaming_type_of(&twin_command), None);

        let response = Signal::command_response(
            "things.responses:modify",
            "org.acme:lamp",
            204,
            DittoHeaders::empty(),
        );
        assert_eq!(streaming_type_of(&response), None);
    }

    #[test]
    fn test_namespace_filter() {
        let mut state = SubscriptionState::new();
        state.apply(&start("START-SEND-EVENTS?namespaces=org.acme,org.example"));

        assert!(state.accepts(&twin_event("org.acme:lamp")));
        assert!(state.accepts(&twin_event("org.example:fan")));
        assert!(!state.accepts(&twin_event("org.other:lamp")));
    }

    #[test]
    fn test_no_namespaces_accepts_all() {
        let mut state = SubscriptionState::new();
        assert!(!state.accepts(&twin_event("org.acme:lamp")));

        state.apply(&start("START-SEND-EVENTS"));
        assert!(state.accepts(&twin_event("org.acme:lamp")));
        assert!(state.accepts(&twin_event("org.other:lamp")));
    }
}
