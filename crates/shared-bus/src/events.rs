//! # Gateway Events
//!
//! Side-channel notifications emitted by gateway components. These are not
//! signals and never reach a connection or a streaming session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    /// A command response was handed to a streaming session for publication.
    ResponsePublished { correlation_id: String },

    /// A connection supervisor changed its supervision state.
    ConnectionStatusChanged { connection_id: String, state: String },

    /// A streaming session was established.
    SessionOpened { session_id: String },

    /// A streaming session ended and released its buffers.
    SessionClosed { session_id: String },
}

impl GatewayEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ResponsePublished { .. } => EventTopic::Responses,
            Self::ConnectionStatusChanged { .. } => EventTopic::Connections,
            Self::SessionOpened { .. } | Self::SessionClosed { .. } => EventTopic::Sessions,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Responses,
    Connections,
    Sessions,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events. Empty means all topics.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    #[must_use]
    pub fn matches(&self, event: &GatewayEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
