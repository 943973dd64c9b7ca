//! # Event Subscriber
//!
//! Defines the subscription side of the gateway event stream.

use crate::events::{EventFilter, GatewayEvent};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was dropped.
    #[error("Event bus closed")]
    Closed,
}

/// Receiving end of the event bus, narrowed by an [`EventFilter`].
///
/// A slow subscriber loses the oldest events rather than stalling
/// publishers; [`Subscription::missed`] reports how many.
pub struct Subscription {
    receiver: broadcast::Receiver<GatewayEvent>,
    filter: EventFilter,
    missed: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<GatewayEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            missed: 0,
        }
    }

    /// Next matching event. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => self.lagged(count),
            }
        }
    }

    /// Non-blocking receive. `Ok(None)` when no matching event is queued.
    pub fn try_recv(&mut self) -> Result<Option<GatewayEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.lagged(count),
            }
        }
    }

    fn lagged(&mut self, count: u64) {
        self.missed += count;
        warn!(lagged = count, missed = self.missed, "Event subscriber lagged, events dropped");
    }

    /// Events lost to lagging so far, matching or not.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
