//! Conversion of a streamed text payload into a signal.
//!
//! Header precedence, lowest first:
//!
//! 1. session defaults (`schema-version`, `authorization-subjects`,
//!    `correlation-id` and `origin` set to the session id)
//! 2. headers supplied with the upgrade request
//! 3. headers of the envelope itself
//!
//! The session-id default never counts as a correlation id: a signal gets a
//! fresh one unless the upgrade request or the envelope supplied it. The
//! authorization subjects are fixed for the session and re-applied last.

use shared_types::{
    keys, AuthorizationContext, DittoHeaders, ProtocolAdapter, ProtocolEnvelope, SchemaVersion,
    Signal, SignalException,
};
use uuid::Uuid;

/// What a session knows about its caller, fixed at upgrade time.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub authorization: AuthorizationContext,
    pub version: SchemaVersion,
    /// Request-scoped headers taken from the upgrade request.
    pub request_headers: DittoHeaders,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        authorization: AuthorizationContext,
        version: SchemaVersion,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            authorization,
            version,
            request_headers: DittoHeaders::empty(),
        }
    }

    /// Keep only the request headers a caller may supply.
    pub fn with_request_headers(mut self, headers: &DittoHeaders) -> Self {
        self.request_headers = headers
            .iter()
            .filter(|(key, _)| keys::REQUEST_SUPPLIED.contains(key))
            .collect();
        self
    }

    fn initial_headers(&self) -> DittoHeaders {
        DittoHeaders::builder()
            .schema_version(self.version)
            .authorization_context(&self.authorization)
            .correlation_id(self.session_id.as_str())
            .origin(self.session_id.as_str())
            .build()
    }
}

pub fn build_signal(
    text: &str,
    context: &SessionContext,
    adapter: &dyn ProtocolAdapter,
) -> Result<Signal, SignalException> {
    let initial = context.initial_headers();
    if text.trim().is_empty() {
        return Err(SignalException::json_invalid("Empty json.").with_headers(initial));
    }

    let signal = ProtocolEnvelope::from_json_str(text)
        .and_then(|envelope| adapter.from_envelope(envelope))
        .map_err(|error| {
            let headers = error
                .headers
                .to_builder()
                .origin(context.session_id.as_str())
                .build();
            error.with_headers(headers)
        })?;

    let mut merged = initial
        .to_builder()
        .put_headers(&context.request_headers)
        .put_headers(signal.headers())
        .authorization_context(&context.authorization);
    let supplied = signal
        .headers()
        .correlation_id()
        .or_else(|| context.request_headers.correlation_id());
    if supplied.is_none() {
        merged = merged.correlation_id(Uuid::new_v4().to_string());
    }

    Ok(signal.with_headers(merged.build()))
}
