//! Transport seams of a streaming session.
//!
//! The session never touches a socket directly: inbound it consumes a
//! stream of [`StreamFrame`]s, outbound it writes through a [`FrameSink`].
//! The server adapts an axum WebSocket to both; tests use channels.

use crate::error::StreamingError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A transport frame as seen by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A text part; `is_final` marks the last part of a payload.
    Text { data: String, is_final: bool },
    /// Binary frames are not part of the protocol; only the size is kept.
    Binary(usize),
    Ping,
    Pong,
    Close,
}

impl StreamFrame {
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text {
            data: data.into(),
            is_final: true,
        }
    }
}

#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), StreamingError>;

    async fn close(&mut self) {}
}

#[async_trait]
impl FrameSink for mpsc::Sender<String> {
    async fn send_text(&mut self, text: String) -> Result<(), StreamingError> {
        self.send(text)
            .await
            .map_err(|_| StreamingError::Send("frame receiver dropped".into()))
    }
}
