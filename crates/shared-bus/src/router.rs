//! # Internal Router
//!
//! The single contract between the gateway and the rest of the platform:
//! fire-and-forget submission of a signal. Replies come back later as
//! ordinary signals on whatever the router delivers to.
//!
//! Two implementations ship here:
//!
//! - [`InMemorySignalRouter`] delivers every submitted signal to all current
//!   subscribers. Each subscriber owns a bounded queue; `submit` waits for
//!   room in every one of them, so a slow subscriber slows the submitters
//!   instead of losing signals.
//! - [`ChannelSignalRouter`] forwards into a bounded `mpsc` channel, so
//!   `submit` suspends until the receiver has room.

use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::Signal;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The receiving side of the router is gone.
    #[error("Router closed")]
    Closed,
}

#[async_trait]
pub trait SignalRouter: Send + Sync {
    /// Hand a signal to the router. Returns once the router accepted it.
    async fn submit(&self, signal: Signal) -> Result<(), RouterError>;
}

pub struct InMemorySignalRouter {
    subscribers: DashMap<u64, mpsc::Sender<Signal>>,
    next_subscriber: AtomicU64,
    capacity: usize,
    submitted: AtomicU64,
}

impl InMemorySignalRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds the queue of each subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_subscriber: AtomicU64::new(0),
            capacity: capacity.max(1),
            submitted: AtomicU64::new(0),
        }
    }

    /// Receive every signal submitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> SignalSubscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, sender);
        SignalSubscription { receiver }
    }

    pub fn signals_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for InMemorySignalRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalRouter for InMemorySignalRouter {
    async fn submit(&self, signal: Signal) -> Result<(), RouterError> {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        // Never hold a map guard across an await.
        let targets: Vec<(u64, mpsc::Sender<Signal>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0usize;
        for (id, sender) in targets {
            if sender.send(signal.clone()).await.is_ok() {
                delivered += 1;
            } else {
                debug!(subscriber = id, "Signal subscriber gone, removing");
                self.subscribers.remove(&id);
            }
        }
        trace!(signal_type = %signal.signal_type(), delivered, "Signal routed");
        Ok(())
    }
}

/// Receiving side of [`InMemorySignalRouter`].
pub struct SignalSubscription {
    receiver: mpsc::Receiver<Signal>,
}

impl SignalSubscription {
    /// Next routed signal, `None` once the router is dropped.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.receiver.recv().await
    }
}

#[derive(Clone)]
pub struct ChannelSignalRouter {
    sender: mpsc::Sender<Signal>,
}

impl ChannelSignalRouter {
    /// Router plus the receiver it forwards into.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Signal>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl SignalRouter for ChannelSignalRouter {
    async fn submit(&self, signal: Signal) -> Result<(), RouterError> {
        self.sender.send(signal).await.map_err(|_| RouterError::Closed)
    }
}
