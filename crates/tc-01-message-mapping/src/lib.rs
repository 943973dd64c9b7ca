//! # TC-01 Message Mapping
//!
//! The message mapping and enforcement pipeline of a connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    MESSAGE MAPPING (tc-01)                           │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ExternalMessage                                                     │
//! │       │                                                              │
//! │  ┌────┴──────┐   ┌───────────────┐   ┌──────────┐   ┌────────────┐   │
//! │  │ Normalizer│ → │ MappingProc.  │ → │ Enforce  │ → │ Map/Adjust │   │
//! │  └───────────┘   └───────────────┘   └──────────┘   └─────┬──────┘   │
//! │                                                           │          │
//! │                       ┌──────────────────┐          ┌─────┴──────┐   │
//! │                       │ RoundTripTracer  │ ←─start─ │  Dispatch  │   │
//! │                       │ (shared, DashMap)│ ←finish─ │  Pipeline  │   │
//! │                       └──────────────────┘          └─────┬──────┘   │
//! └───────────────────────────────────────────────────────────┼──────────┘
//!                       SignalRouter::submit ←────────────────┤
//!                       OutboundPublisher::publish ←──────────┘
//! ```
//!
//! ## Error handling
//!
//! Validation, enforcement and declared domain failures are answered with an
//! addressed error response. Unclassified failures are logged and the
//! message is dropped.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{ChannelPublisher, ProtocolMappingProcessor};
pub use domain::{
    DispatchConfig, EnforcementFilter, EnforcementInput, ExternalMessage, HeaderMapping, Payload,
    spawn_expiry_task, RoundTripTracer,
};
pub use error::{DispatchError, ErrorKind, MappingError, MappingResult, PublishError};
pub use ports::{
    InboundExternalMessage, MappedOutboundSignal, MessageMappingProcessor, OutboundPublisher,
    OutboundSignal, Target,
};
pub use service::{DispatchHandle, DispatchMessage, MessageDispatcher};
