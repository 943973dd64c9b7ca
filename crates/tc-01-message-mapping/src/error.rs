//! Error types for the mapping pipeline.

use crate::domain::placeholder::PlaceholderError;
use shared_types::errors::{codes, status};
use shared_types::{DittoHeaders, SignalException};
use thiserror::Error;

/// Failures along the inbound and outbound mapping path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("No authorization context available")]
    AuthorizationContextMissing,

    #[error("Empty authorization context not allowed")]
    AuthorizationContextEmpty,

    #[error("None of the authorization subjects is applicable to the message")]
    NoApplicableSubjects,

    #[error("Missing header <{key}>")]
    MissingHeader { key: String },

    /// The signal id does not match the connection's enforcement filter.
    #[error(
        "The configured filter <{pattern}> of connection <{connection_id}> could not be matched \
         against the signal id <{actual}>"
    )]
    EnforcementFailed {
        connection_id: String,
        pattern: String,
        actual: String,
        /// Headers of the rejected signal, for addressing the error response.
        headers: DittoHeaders,
    },

    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),

    /// A declared error raised by the mapping processor or downstream.
    #[error("{0}")]
    Domain(SignalException),

    #[error("Unexpected mapping failure: {0}")]
    Unexpected(String),
}

/// Classification driving the dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Enforcement,
    Domain,
    Unclassified,
}

impl MappingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthorizationContextMissing
            | Self::AuthorizationContextEmpty
            | Self::NoApplicableSubjects
            | Self::MissingHeader { .. }
            | Self::Placeholder(_) => ErrorKind::Validation,
            Self::EnforcementFailed { .. } => ErrorKind::Enforcement,
            Self::Domain(_) => ErrorKind::Domain,
            Self::Unexpected(_) => ErrorKind::Unclassified,
        }
    }

    /// Only unclassified failures may be worth a retry by the transport.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unclassified
    }

    /// The addressable error for the far end. `None` for unclassified
    /// failures, which get no reply.
    pub fn to_exception(&self) -> Option<SignalException> {
        let exception = match self {
            Self::AuthorizationContextMissing
            | Self::AuthorizationContextEmpty
            | Self::NoApplicableSubjects => SignalException::new(
                codes::AUTHORIZATION_CONTEXT_INVALID,
                status::BAD_REQUEST,
                self.to_string(),
            )
            .with_description("Check the authorization subjects configured for the connection source."),
            Self::MissingHeader { .. } => {
                SignalException::new(codes::HEADER_MISSING, status::BAD_REQUEST, self.to_string())
            }
            Self::Placeholder(_) => SignalException::new(
                codes::PLACEHOLDER_UNRESOLVED,
                status::BAD_REQUEST,
                self.to_string(),
            ),
            Self::EnforcementFailed { headers, .. } => SignalException::new(
                codes::ENFORCEMENT_FAILED,
                status::BAD_REQUEST,
                self.to_string(),
            )
            .with_description("Make sure the signal id matches the enforcement filter of the connection source.")
            .with_headers(headers.clone()),
            Self::Domain(exception) => exception.clone(),
            Self::Unexpected(_) => return None,
        };
        Some(exception)
    }
}

impl From<SignalException> for MappingError {
    fn from(exception: SignalException) -> Self {
        Self::Domain(exception)
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors from publishing outbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Publisher closed")]
    Closed,

    #[error("Publisher rejected message: {0}")]
    Rejected(String),
}

/// Errors from handing messages to a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Dispatcher for connection <{connection_id}> is closed")]
    Closed { connection_id: String },
}
