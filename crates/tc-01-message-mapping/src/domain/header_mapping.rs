//! # Header Mapper and Header Adjuster
//!
//! Mapping is user configuration and untrusted: it may rewrite any header.
//! Adjusting runs afterwards and always wins for `authorization-subjects` and
//! `origin`, so a mapping can never change who a signal is executed as.

use crate::domain::external::{ExternalMessage, HeaderMapping};
use crate::domain::placeholder::{
    resolve_permissive, HeadersPlaceholder, ThingPlaceholder, TopicPathPlaceholder,
};
use crate::error::{MappingError, MappingResult};
use shared_types::{keys, DittoHeaders, Signal, TopicPath};
use tracing::debug;

/// Apply `mapping` to the signal's headers.
///
/// Each template is resolved permissively against the signal headers, then
/// the entity id, then the topic path. Whatever is still unresolved after
/// the last pass stays in the value literally.
pub fn map_headers(
    signal: &Signal,
    topic_path: Option<&TopicPath>,
    mapping: Option<&HeaderMapping>,
) -> DittoHeaders {
    let Some(mapping) = mapping.filter(|m| !m.is_empty()) else {
        return signal.headers().clone();
    };

    let mut builder = signal.headers().to_builder();
    for (key, template) in mapping.entries() {
        let mut value = resolve_permissive(template, signal.headers(), &HeadersPlaceholder);
        if let Some(entity_id) = signal.entity_id() {
            value = resolve_permissive(&value, entity_id, &ThingPlaceholder);
        }
        if let Some(topic) = topic_path {
            value = resolve_permissive(&value, topic, &TopicPathPlaceholder);
        }
        builder = builder.put(key, value);
    }

    let mapped = builder.build();
    debug!(
        signal_type = signal.signal_type(),
        entries = mapped.len(),
        "Applied header mapping"
    );
    mapped
}

/// Restore the trusted headers after mapping.
pub fn adjust_headers(
    message: &ExternalMessage,
    mapped: &DittoHeaders,
    connection_id: &str,
) -> MappingResult<DittoHeaders> {
    let subjects = message
        .find_header(keys::AUTHORIZATION_SUBJECTS)
        .ok_or_else(|| MappingError::MissingHeader {
            key: keys::AUTHORIZATION_SUBJECTS.to_string(),
        })?;

    let mut builder = mapped
        .to_builder()
        .put(keys::AUTHORIZATION_SUBJECTS, subjects);
    if mapped.origin().is_none() {
        builder = builder.origin(connection_id);
    }
    Ok(builder.build())
}
