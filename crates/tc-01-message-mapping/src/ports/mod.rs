//! Ports: the seams the dispatch pipeline depends on.

pub mod outbound;

pub use outbound::{
    InboundExternalMessage, MappedOutboundSignal, MessageMappingProcessor, OutboundPublisher,
    OutboundSignal, Target,
};
