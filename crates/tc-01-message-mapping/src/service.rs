//! Dispatch Pipeline - one processing unit per connection.
//!
//! The dispatcher owns a bounded mailbox and handles one [`DispatchMessage`]
//! at a time, so messages of a connection are processed in arrival order.
//!
//! ```text
//! inbound:  normalize → process_inbound → enforce → map → adjust → trace → router
//! outbound: process_outbound → publisher
//! response: finish trace → (response-required?) outbound
//! ```

use crate::domain::external::ExternalMessage;
use crate::domain::header_mapping::{adjust_headers, map_headers};
use crate::domain::normalizer::normalize;
use crate::domain::tracer::RoundTripTracer;
use crate::error::{DispatchError, ErrorKind, MappingError, MappingResult};
use crate::ports::outbound::{
    MappedOutboundSignal, MessageMappingProcessor, OutboundPublisher, OutboundSignal,
};
use gateway_telemetry::metrics::{INBOUND_MESSAGES, OUTBOUND_MESSAGES};
use shared_bus::SignalRouter;
use shared_types::{Signal, SignalException};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a dispatcher consumes.
#[derive(Debug, Clone)]
pub enum DispatchMessage {
    /// Consumed from the external transport.
    External(ExternalMessage),
    /// Reply to a signal this connection forwarded earlier.
    CommandResponse(Signal),
    /// Signal to emit towards the given targets.
    Outbound(OutboundSignal),
    /// Signal to emit without explicit targets.
    Signal(Signal),
    /// Failure reported for a signal of this connection.
    Error(SignalException),
}

pub struct MessageDispatcher {
    connection_id: String,
    processor: Arc<dyn MessageMappingProcessor>,
    router: Arc<dyn SignalRouter>,
    publisher: Arc<dyn OutboundPublisher>,
    tracer: Arc<RoundTripTracer>,
}

impl MessageDispatcher {
    pub fn new(
        connection_id: impl Into<String>,
        processor: Arc<dyn MessageMappingProcessor>,
        router: Arc<dyn SignalRouter>,
        publisher: Arc<dyn OutboundPublisher>,
        tracer: Arc<RoundTripTracer>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            processor,
            router,
            publisher,
            tracer,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub async fn handle(&self, message: DispatchMessage) {
        match message {
            DispatchMessage::External(message) => self.handle_inbound(message).await,
            DispatchMessage::CommandResponse(response) => self.handle_response(response).await,
            DispatchMessage::Outbound(outbound) => self.handle_outbound(outbound).await,
            DispatchMessage::Signal(signal) => {
                self.handle_outbound(OutboundSignal::untargeted(signal)).await
            }
            DispatchMessage::Error(error) => {
                let entity_id = error.headers.thing_id().map(str::to_string);
                let headers = error.headers.clone();
                self.handle_response(Signal::error_response(error, entity_id, headers))
                    .await
            }
        }
    }

    async fn handle_inbound(&self, message: ExternalMessage) {
        match self.map_inbound(&message) {
            Ok(Some(signal)) => {
                self.tracer.start(&self.connection_id, &signal);
                let correlation_id = signal.correlation_id().map(str::to_string);
                match self.router.submit(signal).await {
                    Ok(()) => {
                        debug!(
                            connection_id = %self.connection_id,
                            correlation_id = correlation_id.as_deref().unwrap_or_default(),
                            "Forwarded inbound signal"
                        );
                        self.record_inbound("forwarded");
                    }
                    Err(e) => {
                        warn!(connection_id = %self.connection_id, error = %e, "Router refused inbound signal");
                        if let Some(cid) = correlation_id {
                            if let Err(e) = self.tracer.finish(&cid, false) {
                                debug!(connection_id = %self.connection_id, error = %e, "Refused signal without open trace");
                            }
                        }
                        self.record_inbound("dropped");
                    }
                }
            }
            Ok(None) => {
                debug!(connection_id = %self.connection_id, "Inbound message mapped to no signal");
                self.record_inbound("no_signal");
            }
            Err(error) => self.handle_inbound_error(&message, error).await,
        }
    }

    fn map_inbound(&self, message: &ExternalMessage) -> MappingResult<Option<Signal>> {
        let normalized = normalize(message)?;
        let Some(inbound) = self.processor.process_inbound(&normalized)? else {
            return Ok(None);
        };

        if let Some(filter) = normalized.enforcement_filter() {
            filter.matches(&inbound.signal, &message.ditto_headers())?;
        }

        let mapped = map_headers(
            &inbound.signal,
            inbound.topic_path.as_ref(),
            normalized.header_mapping(),
        );
        let adjusted = adjust_headers(&normalized, &mapped, &self.connection_id)?;
        Ok(Some(inbound.signal.with_headers(adjusted)))
    }

    /// Declared failures are answered with an error response; anything else
    /// is logged and the message dropped.
    async fn handle_inbound_error(&self, message: &ExternalMessage, error: MappingError) {
        let Some(exception) = error.to_exception() else {
            // At most once: unclassified failures are not answered or retried here.
            warn!(
                connection_id = %self.connection_id,
                error = %error,
                headers = ?message.headers(),
                "Dropping inbound message after unexpected failure"
            );
            self.record_inbound("dropped");
            return;
        };

        match error.kind() {
            ErrorKind::Domain => info!(connection_id = %self.connection_id, error = %error, "Inbound message failed"),
            _ => warn!(connection_id = %self.connection_id, error = %error, "Inbound message rejected"),
        }

        let headers = exception
            .headers
            .to_builder()
            .put_headers(&message.ditto_headers())
            .build();
        let entity_id = headers.thing_id().map(str::to_string);
        let response = Signal::error_response(exception.with_headers(headers.clone()), entity_id, headers);
        self.record_inbound("error_response");
        self.handle_response(response).await;
    }

    async fn handle_response(&self, response: Signal) {
        if let Some(correlation_id) = response.correlation_id() {
            if let Err(e) = self.tracer.finish(correlation_id, !response.is_error_response()) {
                debug!(connection_id = %self.connection_id, error = %e, "Completion without open trace");
            }
        }

        if response.headers().is_response_required() {
            self.handle_outbound(OutboundSignal::untargeted(response)).await;
        } else {
            debug!(
                connection_id = %self.connection_id,
                correlation_id = response.correlation_id().unwrap_or_default(),
                "Discarding response, none required"
            );
            self.record_outbound("discarded");
        }
    }

    async fn handle_outbound(&self, outbound: OutboundSignal) {
        let message = match self.processor.process_outbound(&outbound.signal) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(
                    connection_id = %self.connection_id,
                    signal_type = outbound.signal.signal_type(),
                    "Outbound signal filtered by mapping"
                );
                self.record_outbound("filtered");
                return;
            }
            Err(error) => {
                match error.kind() {
                    ErrorKind::Domain => info!(connection_id = %self.connection_id, error = %error, "Outbound mapping failed"),
                    _ => warn!(connection_id = %self.connection_id, error = %error, "Outbound mapping failed"),
                }
                self.record_outbound("failed");
                return;
            }
        };

        match self
            .publisher
            .publish(MappedOutboundSignal {
                source: outbound,
                message,
            })
            .await
        {
            Ok(()) => self.record_outbound("published"),
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Publishing outbound message failed");
                self.record_outbound("failed");
            }
        }
    }

    fn record_inbound(&self, outcome: &str) {
        INBOUND_MESSAGES
            .with_label_values(&[self.connection_id.as_str(), outcome])
            .inc();
    }

    fn record_outbound(&self, outcome: &str) {
        OUTBOUND_MESSAGES
            .with_label_values(&[self.connection_id.as_str(), outcome])
            .inc();
    }

    /// Run the dispatcher on its own task.
    ///
    /// The task ends when every handle is dropped or `shutdown` flips to
    /// `true`. Either way the connection's open traces are dropped.
    pub fn spawn(
        self,
        capacity: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> (DispatchHandle, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel(capacity);
        let handle = DispatchHandle {
            connection_id: self.connection_id.clone(),
            sender,
        };

        let task = tokio::spawn(async move {
            info!(connection_id = %self.connection_id, "Dispatcher started");
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    message = receiver.recv() => match message {
                        Some(message) => self.handle(message).await,
                        None => break,
                    },
                }
            }
            let dropped = self.tracer.drop_connection(&self.connection_id);
            info!(connection_id = %self.connection_id, dropped_traces = dropped, "Dispatcher stopped");
        });

        (handle, task)
    }
}

/// Mailbox of a running dispatcher.
#[derive(Clone)]
pub struct DispatchHandle {
    connection_id: String,
    sender: mpsc::Sender<DispatchMessage>,
}

impl DispatchHandle {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Suspends while the mailbox is full.
    pub async fn send(&self, message: DispatchMessage) -> Result<(), DispatchError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| DispatchError::Closed {
                connection_id: self.connection_id.clone(),
            })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChannelPublisher, ProtocolMappingProcessor};
    use crate::domain::enforcement::{EnforcementFilter, EnforcementInput};
    use crate::domain::external::HeaderMapping;
    use crate::ports::outbound::InboundExternalMessage;
    use shared_bus::ChannelSignalRouter;
    use shared_types::errors::codes;
    use shared_types::{keys, AuthorizationContext, DittoHeaders, ProtocolEnvelope};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const MODIFY: &str = r#"{"topic":"ditto/thing/things/twin/commands/modify","headers":{"correlation-id":"c-1"},"path":"/attributes/a","value":1}"#;

    struct Harness {
        dispatcher: MessageDispatcher,
        routed: mpsc::Receiver<Signal>,
        published: mpsc::Receiver<MappedOutboundSignal>,
        tracer: Arc<RoundTripTracer>,
    }

    fn harness_with(processor: Arc<dyn MessageMappingProcessor>) -> Harness {
        let (router, routed) = ChannelSignalRouter::new(16);
        let (publisher, published) = ChannelPublisher::new(16);
        let tracer = Arc::new(RoundTripTracer::new());
        let dispatcher = MessageDispatcher::new(
            "conn",
            processor,
            Arc::new(router),
            Arc::new(publisher),
            tracer.clone(),
        );
        Harness {
            dispatcher,
            routed,
            published,
            tracer,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(ProtocolMappingProcessor::default()))
    }

    fn inbound(payload: &str) -> ExternalMessage {
        ExternalMessage::builder()
            .header("device_id", "ditto:thing")
            .authorization_context(AuthorizationContext::new(["integration:conn"]))
            .text(payload)
            .build()
    }

    fn published_envelope(message: &MappedOutboundSignal) -> ProtocolEnvelope {
        ProtocolEnvelope::from_json_str(message.message.text_payload().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_is_forwarded_with_trusted_headers() {
        let mut h = harness();
        h.dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;

        let signal = h.routed.recv().await.unwrap();
        assert_eq!(signal.correlation_id(), Some("c-1"));
        assert_eq!(
            signal.headers().authorization_subjects(),
            Some(r#"["integration:conn"]"#)
        );
        assert_eq!(signal.headers().origin(), Some("conn"));
        assert_eq!(signal.headers().source(), Some("integration:conn"));
        assert!(h.tracer.is_open("c-1"));
    }

    #[tokio::test]
    async fn test_header_mapping_cannot_escalate_authorization() {
        let mut h = harness();
        let message = inbound(MODIFY)
            .to_builder()
            .header_mapping(HeaderMapping::new([
                (keys::AUTHORIZATION_SUBJECTS, r#"["admin"]"#),
                ("device", "{{ header:device_id }}"),
            ]))
            .build();
        h.dispatcher.handle(DispatchMessage::External(message)).await;

        let signal = h.routed.recv().await.unwrap();
        assert_eq!(
            signal.headers().authorization_subjects(),
            Some(r#"["integration:conn"]"#)
        );
        assert_eq!(signal.headers().get("device"), Some("ditto:thing"));
    }

    #[tokio::test]
    async fn test_missing_authorization_context_never_reaches_processor() {
        struct Unreachable;
        impl MessageMappingProcessor for Unreachable {
            fn process_inbound(&self, _: &ExternalMessage) -> MappingResult<Option<InboundExternalMessage>> {
                panic!("processor must not be called")
            }
            fn process_outbound(&self, _: &Signal) -> MappingResult<Option<ExternalMessage>> {
                Ok(None)
            }
        }

        let mut h = harness_with(Arc::new(Unreachable));
        let message = ExternalMessage::builder().text(MODIFY).build();
        h.dispatcher.handle(DispatchMessage::External(message)).await;
        assert!(h.routed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_enforcement_mismatch_is_answered() {
        let mut h = harness();
        let message = inbound(MODIFY)
            .to_builder()
            .header("device_id", "ditto:other")
            .header(keys::CORRELATION_ID, "c-1")
            .enforcement_filter(EnforcementFilter::new(
                "conn",
                "{{ header:device_id }}",
                EnforcementInput::MessageHeaders,
            ))
            .build();
        h.dispatcher.handle(DispatchMessage::External(message)).await;

        assert!(h.routed.try_recv().is_err());
        let reply = h.published.recv().await.unwrap();
        assert!(reply.source.signal.is_error_response());
        assert_eq!(reply.source.signal.correlation_id(), Some("c-1"));
        let envelope = published_envelope(&reply);
        assert_eq!(envelope.topic, "ditto/thing/things/twin/errors");
        assert_eq!(envelope.value.unwrap()["error"], codes::ENFORCEMENT_FAILED);
    }

    #[tokio::test]
    async fn test_enforcement_match_forwards() {
        let mut h = harness();
        let message = inbound(MODIFY)
            .to_builder()
            .enforcement_filter(EnforcementFilter::new(
                "conn",
                "{{ header:device_id }}",
                EnforcementInput::MessageHeaders,
            ))
            .build();
        h.dispatcher.handle(DispatchMessage::External(message)).await;
        assert!(h.routed.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_refused_signal_closes_its_trace() {
        let mut h = harness();
        drop(h.routed);
        h.dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;

        assert!(!h.tracer.is_open("c-1"));
        assert_eq!(h.tracer.stats().completed.load(Ordering::Relaxed), 1);
        assert_eq!(h.tracer.stats().missing.load(Ordering::Relaxed), 0);
        assert!(h.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refused_signal_with_finished_trace_is_tolerated() {
        // A router that completes the round trip itself and then refuses.
        struct RacingRouter(Arc<RoundTripTracer>);
        #[async_trait::async_trait]
        impl SignalRouter for RacingRouter {
            async fn submit(&self, signal: Signal) -> Result<(), shared_bus::RouterError> {
                if let Some(cid) = signal.correlation_id() {
                    self.0.finish(cid, true).unwrap();
                }
                Err(shared_bus::RouterError::Closed)
            }
        }

        let tracer = Arc::new(RoundTripTracer::new());
        let (publisher, mut published) = ChannelPublisher::new(16);
        let dispatcher = MessageDispatcher::new(
            "conn",
            Arc::new(ProtocolMappingProcessor::default()),
            Arc::new(RacingRouter(tracer.clone())),
            Arc::new(publisher),
            tracer.clone(),
        );
        dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;

        assert!(!tracer.is_open("c-1"));
        assert_eq!(tracer.stats().completed.load(Ordering::Relaxed), 1);
        assert_eq!(tracer.stats().missing.load(Ordering::Relaxed), 1);
        assert!(published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_envelope_headers_cannot_satisfy_enforcement() {
        let mut h = harness();
        let forged = r#"{"topic":"ditto/victim/things/twin/commands/modify","headers":{"correlation-id":"c-9","device_id":"ditto:victim"},"path":"/attributes/a","value":1}"#;
        let message = ExternalMessage::builder()
            .header("device_id", "ditto:lamp")
            .authorization_context(AuthorizationContext::new(["integration:conn"]))
            .enforcement_filter(EnforcementFilter::new(
                "conn",
                "{{ header:device_id }}",
                EnforcementInput::MessageHeaders,
            ))
            .text(forged)
            .build();
        h.dispatcher.handle(DispatchMessage::External(message)).await;

        assert!(h.routed.try_recv().is_err());
        let reply = h.published.recv().await.unwrap();
        assert_eq!(reply.source.signal.correlation_id(), Some("c-9"));
        let envelope = published_envelope(&reply);
        assert_eq!(envelope.topic, "ditto/victim/things/twin/errors");
        assert_eq!(envelope.value.unwrap()["error"], codes::ENFORCEMENT_FAILED);
    }

    #[tokio::test]
    async fn test_no_signal_ends_silently() {
        let mut h = harness();
        let empty = ExternalMessage::builder()
            .authorization_context(AuthorizationContext::new(["integration:conn"]))
            .build();
        h.dispatcher.handle(DispatchMessage::External(empty)).await;
        assert!(h.routed.try_recv().is_err());
        assert!(h.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unclassified_error_is_dropped_without_reply() {
        struct Broken;
        impl MessageMappingProcessor for Broken {
            fn process_inbound(&self, _: &ExternalMessage) -> MappingResult<Option<InboundExternalMessage>> {
                Err(MappingError::Unexpected("codec crashed".into()))
            }
            fn process_outbound(&self, _: &Signal) -> MappingResult<Option<ExternalMessage>> {
                Ok(None)
            }
        }

        let mut h = harness_with(Arc::new(Broken));
        h.dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;
        assert!(h.routed.try_recv().is_err());
        assert!(h.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_response_completes_trace_and_is_published() {
        let mut h = harness();
        h.dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;
        let _ = h.routed.recv().await;

        let response = Signal::command_response(
            "things.responses:modify",
            "ditto:thing",
            204,
            DittoHeaders::builder().correlation_id("c-1").build(),
        );
        h.dispatcher.handle(DispatchMessage::CommandResponse(response)).await;

        assert!(!h.tracer.is_open("c-1"));
        let published = h.published.recv().await.unwrap();
        assert_eq!(published_envelope(&published).status, Some(204));
    }

    #[tokio::test]
    async fn test_response_not_required_completes_trace_without_publishing() {
        let mut h = harness();
        h.dispatcher.handle(DispatchMessage::External(inbound(MODIFY))).await;
        let _ = h.routed.recv().await;

        let response = Signal::command_response(
            "things.responses:modify",
            "ditto:thing",
            204,
            DittoHeaders::builder()
                .correlation_id("c-1")
                .response_required(false)
                .build(),
        );
        h.dispatcher.handle(DispatchMessage::CommandResponse(response)).await;

        assert!(!h.tracer.is_open("c-1"));
        assert_eq!(h.tracer.stats().completed.load(Ordering::Relaxed), 1);
        assert!(h.published.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reported_error_becomes_error_response() {
        let mut h = harness();
        let error = SignalException::json_invalid("downstream").with_headers(
            DittoHeaders::builder()
                .correlation_id("c-9")
                .thing_id("ditto:thing")
                .build(),
        );
        h.dispatcher.handle(DispatchMessage::Error(error)).await;

        let published = h.published.recv().await.unwrap();
        let envelope = published_envelope(&published);
        assert_eq!(envelope.topic, "ditto/thing/things/twin/errors");
        assert_eq!(envelope.headers.correlation_id(), Some("c-9"));
    }

    #[tokio::test]
    async fn test_bare_signal_is_published_untargeted() {
        let mut h = harness();
        let event = Signal::event("things.events:modified", "ditto:thing", DittoHeaders::empty());
        h.dispatcher.handle(DispatchMessage::Signal(event)).await;
        let published = h.published.recv().await.unwrap();
        assert!(published.source.targets.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_keeps_order_and_drops_traces_on_shutdown() {
        let h = harness();
        let mut routed = h.routed;
        let tracer = h.tracer.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = h.dispatcher.spawn(8, shutdown_rx);

        for cid in ["c-1", "c-2", "c-3"] {
            let payload = MODIFY.replace("c-1", cid);
            handle.send(DispatchMessage::External(inbound(&payload))).await.unwrap();
        }
        for cid in ["c-1", "c-2", "c-3"] {
            let signal = tokio::time::timeout(Duration::from_secs(1), routed.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(signal.correlation_id(), Some(cid));
        }
        assert_eq!(tracer.open_count(), 3);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(tracer.open_count(), 0);
        assert!(handle.send(DispatchMessage::Signal(Signal::event(
            "things.events:modified",
            "ditto:thing",
            DittoHeaders::empty(),
        ))).await.is_err());
    }
}
