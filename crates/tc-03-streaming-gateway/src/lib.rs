//! # TC-03 Streaming Gateway
//!
//! Long-lived WebSocket sessions multiplexing four subscription channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                   STREAMING GATEWAY (tc-03)                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  GET /ws/:version  (x-ditto-pre-authenticated)                       │
//! │       │                                                              │
//! │  ┌────┴─────────────┐  inbound   ┌───────────────┐                   │
//! │  │ StreamingSession │ ─────────→ │ SignalRouter  │ ──→ platform      │
//! │  │  (two flows)     │            └───────────────┘                   │
//! │  │                  │  outbound  ┌───────────────┐       │           │
//! │  │                  │ ←───────── │  SessionHub   │ ←─────┘           │
//! │  └──────────────────┘            │ (DashMap)     │                   │
//! │                                  └───────────────┘                   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Control vocabulary
//!
//! `START-SEND-EVENTS`, `START-SEND-MESSAGES`, `START-SEND-LIVE-COMMANDS`,
//! `START-SEND-LIVE-EVENTS` and their `STOP-*` counterparts, acknowledged
//! with `<verb>:ACK`.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod hub;
pub mod ports;
pub mod server;
pub mod session;

pub use domain::{
    build_signal, render, ControlMessage, FrameAssembler, OutboundItem, SessionContext,
    StreamingAck, StreamingConfig, StreamingType, SubscriptionState,
};
pub use error::{StreamingError, StreamingResult};
pub use hub::SessionHub;
pub use ports::{FrameSink, StreamFrame};
pub use server::{create_router, serve, serve_on, StreamingState, PRE_AUTHENTICATED_HEADER};
pub use session::{SessionServices, StreamingSession};
