//! # Shared Types Crate
//!
//! The canonical signal model shared by every gateway component.
//!
//! ## Contents
//!
//! - `headers`: `DittoHeaders`, the typed view over signal headers, and its
//!   overwrite-on-put builder.
//! - `auth`: `AuthorizationContext`, the ordered subject set of a message.
//! - `signal`: `Signal`, a tagged union over command, event, command response
//!   and error response.
//! - `errors`: `SignalException`, the declared, addressable domain error.
//! - `envelope`: the JSON protocol envelope, `TopicPath` and the
//!   `ProtocolAdapter` codec seam.
//! - `duration_serde`: human readable durations for configuration.

pub mod auth;
pub mod duration_serde;
pub mod envelope;
pub mod errors;
pub mod headers;
pub mod signal;

pub use auth::{AuthorizationContext, AuthorizationSubject};
pub use envelope::{DefaultProtocolAdapter, ProtocolAdapter, ProtocolEnvelope, TopicPath};
pub use errors::SignalException;
pub use headers::{keys, Channel, DittoHeaders, DittoHeadersBuilder, SchemaVersion};
pub use signal::{Signal, SignalKind};
