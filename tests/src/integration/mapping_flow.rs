//! # Mapping Flow
//!
//! A connection configured in TOML drives its dispatcher end to end:
//! external message → normalizer → enforcement → header mapping → router,
//! and router responses back through connection routing to the publisher.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};
    use tokio::time::timeout;

    use gateway_runtime::{ConnectionRoutes, GatewayConfig};
    use gateway_telemetry::ROUND_TRIP_DURATION;
    use shared_bus::ChannelSignalRouter;
    use shared_types::errors::codes;
    use shared_types::{DittoHeaders, ProtocolEnvelope, Signal};
    use tc_01_message_mapping::{
        ChannelPublisher, DispatchHandle, DispatchMessage, ExternalMessage, MappedOutboundSignal,
        MessageDispatcher, ProtocolMappingProcessor, RoundTripTracer,
    };
    use tc_02_connection_supervisor::Connection;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const CONNECTIONS: &str = r#"
        [[connections]]
        id = "lamps"
        connection_type = "tcp"
        uri = "127.0.0.1:7000"
        sources = ["devices/lamps"]
        authorization_subjects = ["integration:{{ header:tenant }}", "integration:fallback:{{ header:missing }}"]

        [connections.enforcement]
        filter = "{{ header:device_id }}"

        [connections.header_mapping]
        device = "{{ header:device_id }}"
        thing-name = "{{ thing:name }}"
        action = "{{ topic:action }}"
        hint = "{{ header:channel-hint }}"
    "#;

    fn modify(correlation_id: &str) -> String {
        format!(
            r#"{{"topic":"org.acme/lamp/things/twin/commands/modify","headers":{{"correlation-id":"{correlation_id}"}},"path":"/attributes/on","value":true}}"#
        )
    }

    struct Pipeline {
        connection: Connection,
        dispatch: DispatchHandle,
        routed: mpsc::Receiver<Signal>,
        published: mpsc::Receiver<MappedOutboundSignal>,
        tracer: Arc<RoundTripTracer>,
        _shutdown: watch::Sender<bool>,
    }

    /// The dispatcher the runtime would start for `connection`.
    fn pipeline(connection: Connection) -> Pipeline {
        let (router, routed) = ChannelSignalRouter::new(16);
        let (publisher, published) = ChannelPublisher::new(16);
        let tracer = Arc::new(RoundTripTracer::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (dispatch, _) = MessageDispatcher::new(
            connection.id.clone(),
            Arc::new(ProtocolMappingProcessor::default()),
            Arc::new(router),
            Arc::new(publisher),
            tracer.clone(),
        )
        .spawn(16, shutdown_rx);
        Pipeline {
            connection,
            dispatch,
            routed,
            published,
            tracer,
            _shutdown: shutdown,
        }
    }

    fn configured_connection() -> Connection {
        let config = GatewayConfig::from_toml_str(CONNECTIONS).unwrap();
        config.validate().unwrap();
        config.connections[0].clone()
    }

    /// What a transport worker hands the dispatcher for one consumed message.
    fn consumed(connection: &Connection, headers: &[(&str, &str)], text: String) -> ExternalMessage {
        let source = connection.sources[0].as_str();
        let mut builder = ExternalMessage::builder()
            .headers(headers.iter().copied())
            .authorization_context(connection.authorization_context())
            .source_address(source)
            .text(text);
        if let Some(filter) = connection.enforcement_filter(source) {
            builder = builder.enforcement_filter(filter);
        }
        if let Some(mapping) = connection.header_mapping.clone() {
            builder = builder.header_mapping(mapping);
        }
        builder.build()
    }

    async fn send(pipeline: &Pipeline, message: ExternalMessage) {
        pipeline
            .dispatch
            .send(DispatchMessage::External(message))
            .await
            .unwrap();
    }

    async fn next_routed(pipeline: &mut Pipeline) -> Signal {
        timeout(Duration::from_secs(1), pipeline.routed.recv())
            .await
            .expect("signal routed in time")
            .expect("router open")
    }

    async fn next_published(pipeline: &mut Pipeline) -> ProtocolEnvelope {
        let published = timeout(Duration::from_secs(1), pipeline.published.recv())
            .await
            .expect("message published in time")
            .expect("publisher open");
        ProtocolEnvelope::from_json_str(published.message.text_payload().unwrap()).unwrap()
    }

    // =========================================================================
    // INBOUND: CONFIGURED CONNECTION → ROUTER
    // =========================================================================

    #[tokio::test]
    async fn test_configured_connection_forwards_mapped_signal() {
        let mut p = pipeline(configured_connection());
        let message = consumed(
            &p.connection,
            &[("device_id", "org.acme:lamp"), ("tenant", "acme")],
            modify("c-1"),
        );
        send(&p, message).await;

        let signal = next_routed(&mut p).await;
        assert_eq!(signal.correlation_id(), Some("c-1"));
        assert_eq!(signal.headers().origin(), Some("lamps"));
        // Only the subject whose template resolved survives.
        assert_eq!(signal.headers().source(), Some("integration:acme"));
        assert_eq!(
            signal.headers().authorization_subjects(),
            Some(r#"["integration:acme"]"#)
        );
        assert_eq!(signal.headers().get("device"), Some("org.acme:lamp"));
        assert_eq!(signal.headers().get("thing-name"), Some("lamp"));
        assert_eq!(signal.headers().get("action"), Some("modify"));
        assert_eq!(signal.headers().get("hint"), Some("{{ header:channel-hint }}"));
        assert!(p.tracer.is_open("c-1"));
    }

    #[tokio::test]
    async fn test_enforcement_mismatch_answers_with_error_response() {
        let mut p = pipeline(configured_connection());
        let message = consumed(
            &p.connection,
            &[("device_id", "org.acme:other"), ("tenant", "acme")],
            modify("c-2"),
        );
        send(&p, message).await;

        let envelope = next_published(&mut p).await;
        assert_eq!(envelope.topic, "org.acme/lamp/things/twin/errors");
        assert_eq!(envelope.status, Some(400));
        assert_eq!(envelope.headers.correlation_id(), Some("c-2"));
        assert_eq!(envelope.value.unwrap()["error"], codes::ENFORCEMENT_FAILED);
        assert!(p.routed.try_recv().is_err());
        assert!(!p.tracer.is_open("c-2"));
    }

    #[tokio::test]
    async fn test_device_id_in_payload_headers_is_not_trusted() {
        let mut p = pipeline(configured_connection());
        let forged = modify("c-4").replace(
            r#""correlation-id":"c-4""#,
            r#""correlation-id":"c-4","device_id":"org.acme:lamp""#,
        );
        let message = consumed(
            &p.connection,
            &[("device_id", "org.acme:heater"), ("tenant", "acme")],
            forged,
        );
        send(&p, message).await;

        let envelope = next_published(&mut p).await;
        assert_eq!(envelope.headers.correlation_id(), Some("c-4"));
        assert_eq!(envelope.value.unwrap()["error"], codes::ENFORCEMENT_FAILED);
        assert!(p.routed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_applicable_subject_is_a_validation_error() {
        let mut p = pipeline(configured_connection());
        let message = consumed(
            &p.connection,
            &[("device_id", "org.acme:lamp"), ("correlation-id", "c-3")],
            modify("c-3"),
        );
        send(&p, message).await;

        let envelope = next_published(&mut p).await;
        assert_eq!(envelope.status, Some(400));
        assert_eq!(envelope.headers.correlation_id(), Some("c-3"));
        assert_eq!(
            envelope.value.unwrap()["error"],
            codes::AUTHORIZATION_CONTEXT_INVALID
        );
        assert!(p.routed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_of_one_connection_keep_their_order() {
        let mut connection = configured_connection();
        connection.enforcement = None;
        let mut p = pipeline(connection);

        let ids: Vec<String> = (0..20).map(|i| format!("order-{i}")).collect();
        for id in &ids {
            let message = consumed(&p.connection, &[("tenant", "acme")], modify(id));
            send(&p, message).await;
        }
        for id in &ids {
            assert_eq!(next_routed(&mut p).await.correlation_id(), Some(id.as_str()));
        }
        assert_eq!(p.tracer.open_count(), ids.len());
    }

    // =========================================================================
    // RESPONSES: ROUTER → CONNECTION ROUTING → DISPATCHER
    // =========================================================================

    #[tokio::test]
    async fn test_response_completes_round_trip_and_is_published() {
        let mut p = pipeline(configured_connection());
        let mut routes = ConnectionRoutes::new();
        routes.insert(p.dispatch.clone(), &p.connection.targets);

        let message = consumed(
            &p.connection,
            &[("device_id", "org.acme:lamp"), ("tenant", "acme")],
            modify("c-4"),
        );
        send(&p, message).await;
        let command = next_routed(&mut p).await;

        let response = Signal::command_response(
            "things.responses:modify",
            "org.acme:lamp",
            204,
            command.headers().clone(),
        );
        assert_eq!(routes.route(response).await, 1);

        let envelope = next_published(&mut p).await;
        assert_eq!(envelope.status, Some(204));
        assert_eq!(envelope.headers.correlation_id(), Some("c-4"));
        assert!(!p.tracer.is_open("c-4"));
    }

    #[tokio::test]
    async fn test_response_not_required_is_traced_but_not_published() {
        let mut connection = configured_connection();
        connection.id = "lamps-no-response".to_string();
        connection.enforcement = None;
        let mut p = pipeline(connection);
        let mut routes = ConnectionRoutes::new();
        routes.insert(p.dispatch.clone(), &[]);
        let succeeded = ROUND_TRIP_DURATION
            .with_label_values(&["lamps-no-response", "true"])
            .get_sample_count();

        let message = consumed(&p.connection, &[("tenant", "acme")], modify("c-5"));
        send(&p, message).await;
        next_routed(&mut p).await;
        assert!(p.tracer.is_open("c-5"));

        let response = Signal::command_response(
            "things.responses:modify",
            "org.acme:lamp",
            204,
            DittoHeaders::builder()
                .correlation_id("c-5")
                .origin("lamps-no-response")
                .response_required(false)
                .build(),
        );
        assert_eq!(routes.route(response).await, 1);

        for _ in 0..100 {
            if !p.tracer.is_open("c-5") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!p.tracer.is_open("c-5"));
        assert_eq!(p.tracer.stats().completed.load(Ordering::Relaxed), 1);
        assert_eq!(
            ROUND_TRIP_DURATION
                .with_label_values(&["lamps-no-response", "true"])
                .get_sample_count(),
            succeeded + 1
        );
        assert!(p.published.try_recv().is_err());
    }
}
