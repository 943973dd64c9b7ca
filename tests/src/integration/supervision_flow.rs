//! # Supervision Flow
//!
//! The connection supervisor under a real TCP peer, wired by the gateway
//! runtime:
//!
//! - a dropped peer is reconnected after a bounded backoff;
//! - routed events queued for the connection reach the new incarnation;
//! - an unreachable peer escalates to `failed_terminal`.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    use gateway_runtime::{GatewayConfig, GatewayRuntime};
    use shared_bus::{EventFilter, EventTopic, GatewayEvent, SignalRouter, Subscription};
    use shared_types::{DittoHeaders, Signal};
    use tc_02_connection_supervisor::{Connection, SupervisorConfig};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn fast_supervisor(max_restarts: u32) -> SupervisorConfig {
        SupervisorConfig {
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            random_factor: 0.0,
            registration_max_attempts: 5,
            registration_delay: Duration::from_millis(10),
            max_restarts,
            reset_after: Some(Duration::from_secs(10)),
        }
    }

    fn gateway_config(connection: Connection, max_restarts: u32) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.streaming.host = "127.0.0.1".to_string();
        config.streaming.port = 0;
        config.supervisor = fast_supervisor(max_restarts);
        config.connections = vec![connection];
        config
    }

    fn lamp_connection(uri: String) -> Connection {
        let mut connection = Connection::new("lamps", "tcp", uri);
        connection.authorization_subjects = vec!["integration:lamps".to_string()];
        connection.targets = vec!["devices/lamps/out".to_string()];
        connection
    }

    /// Collect connection states until `state` shows up.
    async fn states_until(events: &mut Subscription, state: &str) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap_or_else(|_| panic!("no `{state}` after {seen:?}"))
                .expect("event bus open");
            if let GatewayEvent::ConnectionStatusChanged { state: current, .. } = event {
                let done = current == state;
                seen.push(current);
                if done {
                    return seen;
                }
            }
        }
    }

    async fn accept(listener: &TcpListener) -> TcpStream {
        let (peer, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("gateway connected in time")
            .unwrap();
        peer
    }

    // =========================================================================
    // BACKOFF
    // =========================================================================

    proptest! {
        #[test]
        fn test_configured_backoff_stays_within_bounds(
            min_ms in 1u64..500,
            spread in 1u64..20,
            random_factor in 0.0f64..=1.0,
            restart in 0u32..64,
        ) {
            let config = SupervisorConfig {
                min_backoff: Duration::from_millis(min_ms),
                max_backoff: Duration::from_millis(min_ms * spread),
                random_factor,
                ..SupervisorConfig::default()
            };
            prop_assert!(config.validate().is_ok());

            let policy = config.backoff_policy();
            let delay = policy.delay(restart);
            prop_assert!(delay >= config.min_backoff);
            prop_assert!(delay <= config.max_backoff);
            prop_assert!(policy.delay_with(restart, 0.0) <= policy.delay_with(restart + 1, 0.0));
        }
    }

    // =========================================================================
    // RECONNECT
    // =========================================================================

    #[tokio::test]
    async fn test_dropped_peer_is_reconnected() {
        let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = peer_listener.local_addr().unwrap().to_string();
        let mut runtime = GatewayRuntime::new(gateway_config(lamp_connection(uri), 5));
        let mut events = runtime
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Connections]));
        let mut routed = runtime.router().subscribe();
        runtime.start().await.unwrap();

        let first = accept(&peer_listener).await;
        assert_eq!(states_until(&mut events, "running").await, vec!["running"]);
        drop(first);

        let second = accept(&peer_listener).await;
        assert_eq!(
            states_until(&mut events, "running").await,
            vec!["backing_off(1)", "starting", "running"]
        );

        let (peer_reader, mut peer_writer) = second.into_split();
        peer_writer
            .write_all(b"{\"topic\":\"org.acme/lamp/things/twin/commands/modify\",\"headers\":{\"correlation-id\":\"after-restart\"},\"path\":\"/attributes/on\",\"value\":true}\n")
            .await
            .unwrap();
        let command = timeout(Duration::from_secs(2), routed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.correlation_id(), Some("after-restart"));
        assert_eq!(command.headers().origin(), Some("lamps"));

        // Events from elsewhere reach the connection through its targets.
        let event = Signal::event(
            "things.events:modified",
            "org.acme:lamp",
            DittoHeaders::builder()
                .correlation_id("e-1")
                .origin("0b7c-session")
                .build(),
        );
        runtime.router().submit(event).await.unwrap();
        let mut lines = BufReader::new(peer_reader).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(line.contains("e-1"));
        assert!(line.contains("org.acme/lamp/things/twin/events/modified"));

        runtime.shutdown().await;
        assert_eq!(states_until(&mut events, "stopped").await, vec!["stopped"]);
    }

    #[tokio::test]
    async fn test_unreachable_peer_escalates_to_failed_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut runtime = GatewayRuntime::new(gateway_config(lamp_connection(uri), 2));
        let mut events = runtime
            .events()
            .subscribe(EventFilter::topics(vec![EventTopic::Connections]));
        runtime.start().await.unwrap();

        let states = states_until(&mut events, "failed_terminal").await;
        assert!(states.contains(&"backing_off(1)".to_string()));
        assert!(states.contains(&"backing_off(2)".to_string()));
        assert!(!states.contains(&"backing_off(3)".to_string()));

        runtime.shutdown().await;
    }
}
