//! Integration flows across the gateway crates.

pub mod mapping_flow;
pub mod streaming_flow;
pub mod supervision_flow;
