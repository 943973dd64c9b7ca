//! # Error Types
//!
//! `SignalException` is the declared, addressable error of the signal model.
//! It renders to an error-response envelope and is what the far end of a
//! connection or streaming session gets to see.

use crate::headers::DittoHeaders;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const JSON_INVALID: &str = "json.invalid";
    pub const COMMAND_NOT_SUPPORTED: &str = "command.notsupported";
    pub const TOPIC_INVALID: &str = "protocol.topic.invalid";
    pub const AUTHORIZATION_CONTEXT_INVALID: &str = "connectivity:message.authorization.invalid";
    pub const HEADER_MISSING: &str = "connectivity:message.header.missing";
    pub const PLACEHOLDER_UNRESOLVED: &str = "connectivity:placeholder.unresolved";
    pub const ENFORCEMENT_FAILED: &str = "connectivity:connection.signalid.enforcement.failed";
    pub const UNSUPPORTED_CONTENT: &str = "connectivity:message.content.unsupported";
    pub const MESSAGE_TOO_LARGE: &str = "gateway:websocket.message.toolarge";
    pub const UNAUTHORIZED: &str = "gateway:authentication.failed";
}

/// HTTP-style status codes carried by error responses.
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    pub const INTERNAL_ERROR: u16 = 500;
}

/// A declared domain error.
///
/// Headers are not part of the JSON value; they travel in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{error_code}] {message}")]
pub struct SignalException {
    #[serde(rename = "error")]
    pub error_code: String,
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub headers: DittoHeaders,
}

impl SignalException {
    pub fn new(error_code: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            status,
            message: message.into(),
            description: None,
            headers: DittoHeaders::empty(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_headers(mut self, headers: DittoHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn json_invalid(detail: impl Into<String>) -> Self {
        Self::new(
            codes::JSON_INVALID,
            status::BAD_REQUEST,
            "Failed to parse JSON.",
        )
        .with_description(detail)
    }

    pub fn command_not_supported(version: impl fmt::Display) -> Self {
        Self::new(
            codes::COMMAND_NOT_SUPPORTED,
            status::BAD_REQUEST,
            format!("The requested resource is not supported by version <{version}>."),
        )
        .with_description("Check if you specified the correct version of the API.")
    }

    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::new(
            codes::MESSAGE_TOO_LARGE,
            status::PAYLOAD_TOO_LARGE,
            format!("The message of <{size}> bytes exceeds the limit of <{max}> bytes."),
        )
    }

    pub fn unauthorized() -> Self {
        Self::new(
            codes::UNAUTHORIZED,
            status::UNAUTHORIZED,
            "No authenticated subjects were provided.",
        )
        .with_description("Provide the pre-authenticated subjects of the caller.")
    }

    pub fn topic_invalid(topic: &str) -> Self {
        Self::new(
            codes::TOPIC_INVALID,
            status::BAD_REQUEST,
            format!("The topic <{topic}> is invalid."),
        )
    }
}
