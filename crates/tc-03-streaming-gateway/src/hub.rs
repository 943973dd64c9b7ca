//! # Session Hub
//!
//! The router-side registry of streaming sessions. It owns each session's
//! subscription state and the sending half of its outbound buffer.
//!
//! - Control messages update the state and are answered with an ack.
//! - Responses are routed to the session named by their `origin` header.
//! - Events, messages and live commands fan out to every session subscribed
//!   to the matching channel, except the session the signal came from.

use crate::domain::{ControlMessage, OutboundItem, SubscriptionState};
use crate::error::StreamingError;
use dashmap::DashMap;
use shared_bus::SignalSubscription;
use shared_types::Signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

struct SessionEntry {
    sender: mpsc::Sender<OutboundItem>,
    subscriptions: SubscriptionState,
}

#[derive(Default)]
pub struct SessionHub {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and return the receiving half of its bounded
    /// outbound buffer. A reconnect under the same id replaces the entry.
    pub fn connect(&self, session_id: &str, buffer_size: usize) -> mpsc::Receiver<OutboundItem> {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let previous = self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                sender,
                subscriptions: SubscriptionState::new(),
            },
        );
        if previous.is_some() {
            warn!(session_id = %session_id, "Replaced existing session registration");
        }
        debug!(session_id = %session_id, buffer_size, "Session connected to hub");
        receiver
    }

    /// Drop a session and its buffer. Returns whether it was registered.
    pub fn disconnect(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Session disconnected from hub");
        }
        removed
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscriptions(&self, session_id: &str) -> Option<SubscriptionState> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.subscriptions.clone())
    }

    /// Apply a control message and push its acknowledgement.
    pub async fn control(
        &self,
        session_id: &str,
        control: ControlMessage,
    ) -> Result<(), StreamingError> {
        let (ack, sender) = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;
            let ack = entry.subscriptions.apply(&control);
            (ack, entry.sender.clone())
        };

        info!(
            session_id = %session_id,
            streaming_type = %control.streaming_type(),
            subscribed = ack.subscribed,
            "Subscription changed"
        );

        sender
            .send(OutboundItem::Ack(ack))
            .await
            .map_err(|_| StreamingError::SessionClosed(session_id.to_string()))
    }

    /// Push an item to one session, waiting for room in its buffer.
    pub async fn deliver(&self, session_id: &str, item: OutboundItem) -> Result<(), StreamingError> {
        let sender = self
            .sessions
            .get(session_id)
            .map(|entry| entry.sender.clone())
            .ok_or_else(|| StreamingError::SessionNotFound(session_id.to_string()))?;
        sender
            .send(item)
            .await
            .map_err(|_| StreamingError::SessionClosed(session_id.to_string()))
    }

    /// Route one signal coming back from the router. Returns the number of
    /// sessions it was delivered to.
    pub async fn dispatch(&self, signal: Signal) -> usize {
        if signal.is_response() {
            return self.dispatch_response(signal).await;
        }

        let origin = signal.headers().origin().map(str::to_string);
        let targets: Vec<(String, mpsc::Sender<OutboundItem>)> = self
            .sessions
            .iter()
            .filter(|entry| origin.as_deref() != Some(entry.key().as_str()))
            .filter(|entry| entry.subscriptions.accepts(&signal))
            .map(|entry| (entry.key().clone(), entry.sender.clone()))
            .collect();

        let mut delivered = 0;
        for (session_id, sender) in targets {
            if sender.send(OutboundItem::Signal(signal.clone())).await.is_ok() {
                delivered += 1;
            } else {
                debug!(session_id = %session_id, "Session buffer closed during fan-out");
            }
        }
        trace!(
            signal_type = %signal.signal_type(),
            delivered,
            "Signal fanned out"
        );
        delivered
    }

    async fn dispatch_response(&self, signal: Signal) -> usize {
        let Some(origin) = signal.headers().origin().map(str::to_string) else {
            trace!(signal_type = %signal.signal_type(), "Response without origin, not for a session");
            return 0;
        };
        let Some(sender) = self.sessions.get(&origin).map(|entry| entry.sender.clone()) else {
            trace!(origin = %origin, "Response origin is not a streaming session");
            return 0;
        };
        match sender.send(OutboundItem::Signal(signal)).await {
            Ok(()) => 1,
            Err(_) => {
                debug!(session_id = %origin, "Session closed before its response arrived");
                0
            }
        }
    }

    /// Feed routed signals into the hub until the router closes or
    /// shutdown is signalled.
    pub async fn run(&self, mut signals: SignalSubscription, mut shutdown: watch::Receiver<bool>) {
        info!("Session hub started");
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        self.dispatch(signal).await;
                    }
                    None => {
                        info!("Router closed, session hub stopping");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Session hub shutting down");
                        break;
                    }
                }
            }
        }
    }
}
