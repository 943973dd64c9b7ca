//! Domain layer: control vocabulary, subscription state and the pure
//! inbound and outbound conversions of a session.

pub mod assembler;
pub mod config;
pub mod control;
pub mod render;
pub mod signal_builder;
pub mod subscription;

pub use assembler::FrameAssembler;
pub use config::StreamingConfig;
pub use control::{ControlMessage, StreamingAck, StreamingType, ACK_SUFFIX};
pub use render::{render, select_channel, OutboundItem};
pub use signal_builder::{build_signal, SessionContext};
pub use subscription::{streaming_type_of, ChannelSubscription, SubscriptionState};
