//! Publisher that hands mapped messages to the connection worker over a
//! bounded channel.

use crate::error::PublishError;
use crate::ports::outbound::{MappedOutboundSignal, OutboundPublisher};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<MappedOutboundSignal>,
}

impl ChannelPublisher {
    /// Publisher plus the receiver the transport drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MappedOutboundSignal>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl OutboundPublisher for ChannelPublisher {
    /// Suspends while the channel is full.
    async fn publish(&self, message: MappedOutboundSignal) -> Result<(), PublishError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| PublishError::Closed)
    }
}
