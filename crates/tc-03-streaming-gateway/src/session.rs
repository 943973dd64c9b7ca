//! # Streaming Session
//!
//! One accepted upgrade runs two flows that share the session id and the
//! caller's authorization context:
//!
//! ```text
//!  frames ─→ assemble ─→ control? ──yes──→ hub.control (ack comes back outbound)
//!                            │ no
//!                            ↓
//!                      build_signal ──err──→ hub.deliver(Error)
//!                            │ ok
//!                            ↓
//!                    bounded queue ─→ router.submit
//!
//!  hub ─→ bounded buffer ─→ ResponsePublished? ─→ render ─→ sink
//! ```
//!
//! Either flow ending ends the session: the other flow is dropped, the hub
//! entry and both buffers are released.

use crate::domain::{
    build_signal, render, ControlMessage, FrameAssembler, OutboundItem, SessionContext,
    StreamingConfig,
};
use crate::error::StreamingError;
use crate::hub::SessionHub;
use crate::ports::{FrameSink, StreamFrame};
use futures::{Stream, StreamExt};
use gateway_telemetry::STREAMING_SESSIONS;
use shared_bus::{EventPublisher, GatewayEvent, SignalRouter};
use shared_types::{DittoHeaders, ProtocolAdapter, Signal, SignalException, SignalKind};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Shared collaborators of every session.
#[derive(Clone)]
pub struct SessionServices {
    pub hub: Arc<SessionHub>,
    pub router: Arc<dyn SignalRouter>,
    pub events: Arc<dyn EventPublisher>,
    pub adapter: Arc<dyn ProtocolAdapter>,
    pub config: Arc<StreamingConfig>,
}

pub struct StreamingSession {
    context: Arc<SessionContext>,
    services: SessionServices,
}

impl StreamingSession {
    pub fn new(context: SessionContext, services: SessionServices) -> Self {
        Self {
            context: Arc::new(context),
            services,
        }
    }

    pub fn id(&self) -> &str {
        &self.context.session_id
    }

    /// Run until the frame stream ends, the sink fails or shutdown is
    /// signalled.
    pub async fn run<S, K>(self, frames: S, sink: K, mut shutdown: watch::Receiver<bool>)
    where
        S: Stream<Item = StreamFrame> + Send + Unpin,
        K: FrameSink,
    {
        let session_id = self.context.session_id.clone();
        let services = self.services;
        let outbound_rx = services
            .hub
            .connect(&session_id, services.config.publisher_backpressure_buffer_size);
        let (queue_tx, queue_rx) = mpsc::channel(services.config.subscriber_backpressure_queue_size);

        STREAMING_SESSIONS.inc();
        services
            .events
            .publish(GatewayEvent::SessionOpened {
                session_id: session_id.clone(),
            })
            .await;
        info!(
            session_id = %session_id,
            version = %self.context.version,
            subjects = self.context.authorization.len(),
            "Streaming session established"
        );

        let inbound = inbound_flow(
            frames,
            Arc::clone(&self.context),
            queue_tx,
            services.clone(),
        );
        let forward = forward_flow(queue_rx, Arc::clone(&services.router), session_id.clone());
        let outbound = outbound_flow(
            outbound_rx,
            sink,
            Arc::clone(&services.events),
            Arc::clone(&services.adapter),
            session_id.clone(),
        );

        tokio::select! {
            // The forwarder drains once inbound closes the queue.
            (result, ()) = async { tokio::join!(inbound, forward) } => match result {
                Ok(()) => debug!(session_id = %session_id, "Inbound flow finished"),
                Err(e) => warn!(session_id = %session_id, error = %e, "Inbound flow failed"),
            },
            () = outbound => debug!(session_id = %session_id, "Outbound flow finished"),
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!(session_id = %session_id, "Session cancelled by shutdown");
            }
        }

        services.hub.disconnect(&session_id);
        STREAMING_SESSIONS.dec();
        services
            .events
            .publish(GatewayEvent::SessionClosed {
                session_id: session_id.clone(),
            })
            .await;
        info!(session_id = %session_id, "Streaming session closed");
    }
}

async fn inbound_flow<S>(
    mut frames: S,
    context: Arc<SessionContext>,
    queue: mpsc::Sender<Signal>,
    services: SessionServices,
) -> Result<(), StreamingError>
where
    S: Stream<Item = StreamFrame> + Send + Unpin,
{
    let session_id = context.session_id.as_str();
    let mut assembler = FrameAssembler::new(services.config.max_message_size);

    while let Some(frame) = frames.next().await {
        let text = match frame {
            StreamFrame::Text { data, is_final } => match assembler.push(&data, is_final) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(StreamingError::MessageTooLarge { size, max }) => {
                    warn!(session_id = %session_id, size, max, "Inbound message too large");
                    let error = SignalException::message_too_large(size, max)
                        .with_headers(origin_headers(session_id));
                    services.hub.deliver(session_id, OutboundItem::Error(error)).await?;
                    continue;
                }
                Err(e) => return Err(e),
            },
            StreamFrame::Binary(len) => {
                debug!(session_id = %session_id, len, "Ignoring binary frame");
                continue;
            }
            StreamFrame::Ping | StreamFrame::Pong => continue,
            StreamFrame::Close => {
                debug!(session_id = %session_id, "Close frame received");
                break;
            }
        };

        if let Some(control) = ControlMessage::parse(&text) {
            services.hub.control(session_id, control).await?;
            continue;
        }

        match build_signal(&text, &context, services.adapter.as_ref()) {
            Ok(signal) => {
                debug!(
                    session_id = %session_id,
                    signal_type = %signal.signal_type(),
                    correlation_id = signal.correlation_id().unwrap_or_default(),
                    "Inbound signal"
                );
                if queue.send(signal).await.is_err() {
                    return Err(StreamingError::SessionClosed(session_id.to_string()));
                }
            }
            Err(error) => {
                info!(session_id = %session_id, error = %error, "Rejected inbound payload");
                services.hub.deliver(session_id, OutboundItem::Error(error)).await?;
            }
        }
    }
    Ok(())
}

async fn forward_flow(
    mut queue: mpsc::Receiver<Signal>,
    router: Arc<dyn SignalRouter>,
    session_id: String,
) {
    while let Some(signal) = queue.recv().await {
        if let Err(e) = router.submit(signal).await {
            warn!(session_id = %session_id, error = %e, "Router rejected inbound signal");
            break;
        }
    }
}

async fn outbound_flow<K: FrameSink>(
    mut items: mpsc::Receiver<OutboundItem>,
    mut sink: K,
    events: Arc<dyn EventPublisher>,
    adapter: Arc<dyn ProtocolAdapter>,
    session_id: String,
) {
    while let Some(item) = items.recv().await {
        if let OutboundItem::Signal(signal) = &item {
            if let (SignalKind::CommandResponse { .. }, Some(correlation_id)) =
                (signal.kind(), signal.correlation_id())
            {
                events
                    .publish(GatewayEvent::ResponsePublished {
                        correlation_id: correlation_id.to_string(),
                    })
                    .await;
            }
        }

        let text = render(&item, adapter.as_ref());
        if let Err(e) = sink.send_text(text).await {
            warn!(session_id = %session_id, error = %e, "Failed to write outbound frame");
            break;
        }
    }
    sink.close().await;
}

fn origin_headers(session_id: &str) -> DittoHeaders {
    DittoHeaders::builder()
        .correlation_id(session_id)
        .origin(session_id)
        .build()
}

pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
