//! # Streaming Flow
//!
//! Several streaming sessions attached to one router through the session
//! hub, the way the runtime wires them:
//!
//! 1. **Session → Router**: complete frames become signals with session
//!    headers and a correlation id.
//! 2. **Control → Hub**: subscription changes are acknowledged in-band.
//! 3. **Router → Session**: events fan out to subscribers, responses return
//!    to the session that asked.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};
    use tokio::time::timeout;
    use tokio_stream::wrappers::ReceiverStream;

    use shared_bus::{
        EventFilter, EventTopic, GatewayEvent, InMemoryEventBus, InMemorySignalRouter,
        SignalRouter,
    };
    use shared_types::errors::codes;
    use shared_types::{
        AuthorizationContext, DefaultProtocolAdapter, DittoHeaders, ProtocolEnvelope,
        SchemaVersion, Signal,
    };
    use tc_03_streaming_gateway::{
        ControlMessage, SessionContext, SessionHub, SessionServices, StreamFrame,
        StreamingConfig, StreamingSession, StreamingType,
    };

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const MODIFY: &str = r#"{"topic":"org.acme/lamp/things/twin/commands/modify","headers":{},"path":"/attributes/on","value":true}"#;

    fn modified_event(namespace: &str) -> String {
        format!(
            r#"{{"topic":"{namespace}/lamp/things/twin/events/modified","headers":{{"correlation-id":"e-{namespace}"}},"path":"/attributes/on","value":true}}"#
        )
    }

    struct Gateway {
        router: Arc<InMemorySignalRouter>,
        events: Arc<InMemoryEventBus>,
        hub: Arc<SessionHub>,
        config: Arc<StreamingConfig>,
        shutdown: watch::Sender<bool>,
    }

    struct Client {
        id: String,
        frames: mpsc::Sender<StreamFrame>,
        written: mpsc::Receiver<String>,
    }

    /// Router, event bus and a running hub.
    fn gateway() -> Gateway {
        let router = Arc::new(InMemorySignalRouter::new());
        let hub = Arc::new(SessionHub::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn({
            let hub = Arc::clone(&hub);
            let signals = router.subscribe();
            async move { hub.run(signals, shutdown_rx).await }
        });
        Gateway {
            router,
            events: Arc::new(InMemoryEventBus::new()),
            hub,
            config: Arc::new(StreamingConfig::default()),
            shutdown,
        }
    }

    impl Gateway {
        fn connect(&self, session_id: &str) -> Client {
            let services = SessionServices {
                hub: Arc::clone(&self.hub),
                router: self.router.clone(),
                events: self.events.clone(),
                adapter: Arc::new(DefaultProtocolAdapter),
                config: Arc::clone(&self.config),
            };
            let context = SessionContext::new(
                session_id,
                AuthorizationContext::new(["integration:alice"]),
                SchemaVersion::V2,
            );
            let (frames, frames_rx) = mpsc::channel(16);
            let (sink, written) = mpsc::channel(16);
            let session = StreamingSession::new(context, services);
            tokio::spawn(session.run(
                ReceiverStream::new(frames_rx),
                sink,
                self.shutdown.subscribe(),
            ));
            Client {
                id: session_id.to_string(),
                frames,
                written,
            }
        }
    }

    impl Client {
        async fn send(&self, text: impl Into<String>) {
            self.frames.send(StreamFrame::text(text)).await.unwrap();
        }

        async fn next_text(&mut self) -> String {
            timeout(Duration::from_secs(1), self.written.recv())
                .await
                .expect("frame written in time")
                .expect("session open")
        }

        async fn next_envelope(&mut self) -> ProtocolEnvelope {
            let text = self.next_text().await;
            ProtocolEnvelope::from_json_str(&text).unwrap()
        }

        async fn assert_silent(&mut self) {
            let next = timeout(Duration::from_millis(100), self.written.recv()).await;
            assert!(next.is_err(), "unexpected frame: {next:?}");
        }

        async fn subscribe(&mut self, control: &str) {
            self.send(control).await;
            let verb = ControlMessage::parse(control).unwrap().verb();
            assert_eq!(self.next_text().await, format!("{verb}:ACK"));
        }
    }

    // =========================================================================
    // SESSION → ROUTER
    // =========================================================================

    #[tokio::test]
    async fn test_frame_without_correlation_id_gets_generated_one() {
        let g = gateway();
        let mut routed = g.router.subscribe();
        let client = g.connect("session-a");

        client.send(MODIFY).await;

        let signal = timeout(Duration::from_secs(1), routed.recv())
            .await
            .unwrap()
            .unwrap();
        let correlation_id = signal.correlation_id().unwrap();
        let generated = uuid::Uuid::parse_str(correlation_id).unwrap();
        assert_eq!(generated.get_version_num(), 4);
        assert_eq!(signal.headers().origin(), Some("session-a"));
        assert_eq!(signal.headers().schema_version(), Some(SchemaVersion::V2));
        assert_eq!(
            signal.headers().authorization_subjects(),
            Some(r#"["integration:alice"]"#)
        );
    }

    #[tokio::test]
    async fn test_fragmented_frame_is_reassembled_before_parsing() {
        let g = gateway();
        let mut routed = g.router.subscribe();
        let client = g.connect("session-a");

        let (head, tail) = MODIFY.split_at(20);
        client
            .frames
            .send(StreamFrame::Text {
                data: head.to_string(),
                is_final: false,
            })
            .await
            .unwrap();
        client
            .frames
            .send(StreamFrame::Text {
                data: tail.to_string(),
                is_final: true,
            })
            .await
            .unwrap();

        let signal = timeout(Duration::from_secs(1), routed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.signal_type(), "things.commands:modify");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_answered_on_the_same_session() {
        let g = gateway();
        let mut routed = g.router.subscribe();
        let mut a = g.connect("session-a");
        let mut b = g.connect("session-b");

        a.send("{not json").await;

        let envelope = a.next_envelope().await;
        assert_eq!(envelope.topic, "_/_/things/twin/errors");
        assert_eq!(envelope.status, Some(400));
        assert_eq!(envelope.headers.origin(), Some("session-a"));
        assert_eq!(envelope.value.unwrap()["error"], codes::JSON_INVALID);
        b.assert_silent().await;
        let nothing = timeout(Duration::from_millis(50), routed.recv()).await;
        assert!(nothing.is_err());
    }

    // =========================================================================
    // CONTROL → HUB → FAN-OUT
    // =========================================================================

    #[tokio::test]
    async fn test_subscribed_session_receives_events_of_its_namespaces() {
        let g = gateway();
        let mut a = g.connect("session-a");
        let mut b = g.connect("session-b");
        a.subscribe("START-SEND-EVENTS?namespaces=org.acme,com.example").await;
        b.subscribe("START-SEND-EVENTS").await;

        b.send(modified_event("org.other")).await;
        b.send(modified_event("org.acme")).await;

        let envelope = a.next_envelope().await;
        assert_eq!(envelope.topic, "org.acme/lamp/things/twin/events/modified");
        assert_eq!(envelope.headers.correlation_id(), Some("e-org.acme"));
        a.assert_silent().await;
        // The sender never sees its own event.
        b.assert_silent().await;
    }

    #[tokio::test]
    async fn test_stop_ends_delivery() {
        let g = gateway();
        let mut a = g.connect("session-a");
        let b = g.connect("session-b");
        a.subscribe("START-SEND-EVENTS").await;
        a.subscribe("STOP-SEND-EVENTS?namespaces=ignored").await;

        let state = g.hub.subscriptions(&a.id).unwrap();
        assert!(!state.is_subscribed(StreamingType::Events));

        b.send(modified_event("org.acme")).await;
        a.assert_silent().await;
    }

    #[tokio::test]
    async fn test_live_commands_need_live_subscription() {
        let g = gateway();
        let mut a = g.connect("session-a");
        let b = g.connect("session-b");
        a.subscribe("START-SEND-EVENTS").await;

        let live = r#"{"topic":"org.acme/lamp/things/live/commands/modify","headers":{"correlation-id":"l-1"},"path":"/attributes/on","value":true}"#;
        b.send(live).await;
        a.assert_silent().await;

        a.subscribe("START-SEND-LIVE-COMMANDS").await;
        b.send(live.replace("l-1", "l-2")).await;
        let envelope = a.next_envelope().await;
        assert_eq!(envelope.topic, "org.acme/lamp/things/live/commands/modify");
        assert_eq!(envelope.headers.correlation_id(), Some("l-2"));
    }

    // =========================================================================
    // ROUTER → SESSION RESPONSES
    // =========================================================================

    #[tokio::test]
    async fn test_response_returns_to_requesting_session() {
        let g = gateway();
        let mut routed = g.router.subscribe();
        let mut published = g
            .events
            .subscribe(EventFilter::topics(vec![EventTopic::Responses]));
        let mut a = g.connect("session-a");
        let mut b = g.connect("session-b");

        a.send(MODIFY.replace(r#""headers":{}"#, r#""headers":{"correlation-id":"c-7"}"#))
            .await;
        let command = timeout(Duration::from_secs(1), routed.recv())
            .await
            .unwrap()
            .unwrap();

        let response = Signal::command_response(
            "things.responses:modify",
            "org.acme:lamp",
            204,
            command.headers().clone(),
        );
        g.router.submit(response).await.unwrap();

        let envelope = a.next_envelope().await;
        assert_eq!(envelope.status, Some(204));
        assert_eq!(envelope.headers.correlation_id(), Some("c-7"));
        b.assert_silent().await;

        let event = timeout(Duration::from_secs(1), published.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            GatewayEvent::ResponsePublished {
                correlation_id: "c-7".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_response_for_closed_session_is_dropped() {
        let g = gateway();
        let a = g.connect("session-a");
        a.frames.send(StreamFrame::Close).await.unwrap();

        for _ in 0..100 {
            if !g.hub.is_connected("session-a") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!g.hub.is_connected("session-a"));

        let response = Signal::command_response(
            "things.responses:modify",
            "org.acme:lamp",
            204,
            DittoHeaders::builder().origin("session-a").build(),
        );
        assert_eq!(g.hub.dispatch(response).await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session() {
        let g = gateway();
        let mut sessions = g
            .events
            .subscribe(EventFilter::topics(vec![EventTopic::Sessions]));
        let mut a = g.connect("session-a");
        let mut b = g.connect("session-b");
        a.subscribe("START-SEND-EVENTS").await;
        b.subscribe("START-SEND-EVENTS").await;
        assert_eq!(g.hub.session_count(), 2);

        g.shutdown.send(true).unwrap();

        let mut closed = 0;
        while closed < 2 {
            let event = timeout(Duration::from_secs(1), sessions.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, GatewayEvent::SessionClosed { .. }) {
                closed += 1;
            }
        }
        assert_eq!(g.hub.session_count(), 0);
        assert!(a.written.recv().await.is_none());
        assert!(b.written.recv().await.is_none());
    }
}
