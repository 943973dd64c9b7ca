//! Default implementations of the mapping ports.

pub mod channel_publisher;
pub mod protocol_processor;

pub use channel_publisher::ChannelPublisher;
pub use protocol_processor::ProtocolMappingProcessor;
