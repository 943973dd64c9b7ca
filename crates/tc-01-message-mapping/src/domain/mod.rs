//! Domain layer: pure mapping logic and the shared trace table.

pub mod config;
pub mod enforcement;
pub mod external;
pub mod header_mapping;
pub mod normalizer;
pub mod placeholder;
pub mod tracer;

pub use config::{ConfigError, DispatchConfig};
pub use enforcement::{EnforcementFilter, EnforcementInput};
pub use external::{ExternalMessage, ExternalMessageBuilder, HeaderMapping, Payload, PayloadType};
pub use header_mapping::{adjust_headers, map_headers};
pub use normalizer::normalize;
pub use placeholder::{
    resolve_permissive, resolve_strict, HeadersPlaceholder, Placeholder, PlaceholderError,
    SourceAddressPlaceholder, ThingPlaceholder, TopicPathPlaceholder,
};
pub use tracer::{spawn_expiry_task, RoundTripTracer, TraceError, TraceStats};
