//! Outbound ports of the dispatch pipeline.

use crate::domain::external::ExternalMessage;
use crate::error::{MappingResult, PublishError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Signal, TopicPath};

/// A signal decoded from an external message, plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundExternalMessage {
    pub signal: Signal,
    pub topic_path: Option<TopicPath>,
    pub source: ExternalMessage,
}

/// Address on the external transport an outbound message is published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// A signal to emit on the connection, with its explicit targets.
///
/// An empty target set means "no routing restriction", the publisher picks.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSignal {
    pub signal: Signal,
    pub targets: Vec<Target>,
}

impl OutboundSignal {
    pub fn new(signal: Signal, targets: Vec<Target>) -> Self {
        Self { signal, targets }
    }

    pub fn untargeted(signal: Signal) -> Self {
        Self::new(signal, Vec::new())
    }
}

/// An outbound signal after mapping, ready for the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedOutboundSignal {
    pub source: OutboundSignal,
    pub message: ExternalMessage,
}

/// Payload codec between external messages and signals.
///
/// `Ok(None)` is a legitimate outcome in both directions: the message or
/// signal is filtered by the mapping configuration and nothing is emitted.
pub trait MessageMappingProcessor: Send + Sync {
    fn process_inbound(&self, message: &ExternalMessage) -> MappingResult<Option<InboundExternalMessage>>;

    fn process_outbound(&self, signal: &Signal) -> MappingResult<Option<ExternalMessage>>;
}

/// Hands mapped messages to the transport.
///
/// Backpressure is expressed by suspending `publish`, never by dropping.
#[async_trait]
pub trait OutboundPublisher: Send + Sync {
    async fn publish(&self, message: MappedOutboundSignal) -> Result<(), PublishError>;
}
