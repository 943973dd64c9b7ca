//! # Message Normalizer
//!
//! First step of the inbound path. Validates the authorization context and
//! stamps `authorization-subjects` and `source` on the message.
//!
//! Subject ids may be templates (`integration:{{ header:tenant }}`). A subject
//! is applicable only if its template resolves completely against the
//! message headers and source address; the rest are dropped.

use crate::domain::external::ExternalMessage;
use crate::domain::placeholder::{
    ensure_resolved, resolve_permissive, resolve_strict, HeadersPlaceholder,
    SourceAddressPlaceholder,
};
use crate::error::{MappingError, MappingResult};
use shared_types::{keys, AuthorizationContext};
use tracing::debug;

pub fn normalize(message: &ExternalMessage) -> MappingResult<ExternalMessage> {
    let context = message
        .authorization_context()
        .ok_or(MappingError::AuthorizationContextMissing)?;
    if context.is_empty() {
        return Err(MappingError::AuthorizationContextEmpty);
    }

    let filtered = filter_applicable(context, message);
    let Some(first) = filtered.first() else {
        return Err(MappingError::NoApplicableSubjects);
    };

    Ok(message
        .with_header(keys::SOURCE, first.id())
        .with_header(keys::AUTHORIZATION_SUBJECTS, filtered.to_json_array()))
}

fn filter_applicable(context: &AuthorizationContext, message: &ExternalMessage) -> AuthorizationContext {
    let resolved = context.iter().filter_map(|subject| {
        let partial = resolve_permissive(subject.id(), message.headers(), &HeadersPlaceholder);
        let result = match message.source_address() {
            Some(address) => resolve_strict(&partial, address, &SourceAddressPlaceholder),
            None => ensure_resolved(&partial),
        };
        match result {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(subject = %subject, error = %e, "Dropping inapplicable authorization subject");
                None
            }
        }
    });
    AuthorizationContext::new(resolved)
}
