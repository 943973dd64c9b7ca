//! # Canonical Headers
//!
//! `DittoHeaders` is a typed view over a string map. Recognized keys get typed
//! getters, every other key is carried through untouched. Keys are
//! case-insensitive and stored lowercase.
//!
//! Headers are immutable; modification goes through [`DittoHeadersBuilder`],
//! where a later `put` of the same key overwrites an earlier one.

use crate::auth::AuthorizationContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Recognized header keys.
pub mod keys {
    pub const CORRELATION_ID: &str = "correlation-id";
    pub const AUTHORIZATION_SUBJECTS: &str = "authorization-subjects";
    pub const ORIGIN: &str = "origin";
    pub const RESPONSE_REQUIRED: &str = "response-required";
    pub const CHANNEL: &str = "channel";
    pub const SCHEMA_VERSION: &str = "schema-version";
    pub const SOURCE: &str = "source";
    pub const THING_ID: &str = "thing-id";
    pub const CONTENT_TYPE: &str = "content-type";

    /// Keys a caller may legitimately supply on a streaming upgrade request.
    pub const REQUEST_SUPPLIED: &[&str] = &[CORRELATION_ID, RESPONSE_REQUIRED, CHANNEL, CONTENT_TYPE];
}

/// Routing channel of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Persisted digital twin.
    Twin,
    /// Routed to the device, nothing persisted.
    Live,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Twin => "twin",
            Channel::Live => "live",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "twin" => Some(Channel::Twin),
            "live" => Some(Channel::Live),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON schema version of the signal representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(u8);

impl SchemaVersion {
    pub const V1: SchemaVersion = SchemaVersion(1);
    pub const V2: SchemaVersion = SchemaVersion(2);
    pub const LATEST: SchemaVersion = SchemaVersion::V2;

    /// Returns `None` for versions this gateway does not speak.
    pub fn from_int(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_int(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DittoHeaders {
    entries: BTreeMap<String, String>,
}

impl DittoHeaders {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> DittoHeadersBuilder {
        DittoHeadersBuilder::default()
    }

    /// Start a builder seeded with these headers.
    pub fn to_builder(&self) -> DittoHeadersBuilder {
        DittoHeadersBuilder {
            entries: self.entries.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Correlation id, treating a blank value as absent.
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(keys::CORRELATION_ID).filter(|v| !v.trim().is_empty())
    }

    pub fn origin(&self) -> Option<&str> {
        self.get(keys::ORIGIN).filter(|v| !v.is_empty())
    }

    pub fn source(&self) -> Option<&str> {
        self.get(keys::SOURCE)
    }

    pub fn authorization_subjects(&self) -> Option<&str> {
        self.get(keys::AUTHORIZATION_SUBJECTS)
    }

    pub fn thing_id(&self) -> Option<&str> {
        self.get(keys::THING_ID)
    }

    /// Raw `channel` value, present even if it is not a known channel.
    pub fn channel_value(&self) -> Option<&str> {
        self.get(keys::CHANNEL)
    }

    pub fn channel(&self) -> Option<Channel> {
        self.channel_value().and_then(Channel::parse)
    }

    /// Defaults to `true` when the header is absent or unparsable.
    pub fn is_response_required(&self) -> bool {
        !matches!(
            self.get(keys::RESPONSE_REQUIRED).map(|v| v.trim().to_ascii_lowercase()),
            Some(v) if v == "false"
        )
    }

    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.get(keys::SCHEMA_VERSION)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(SchemaVersion::from_int)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.entries
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DittoHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        DittoHeaders::builder().put_all(iter).build()
    }
}

impl From<BTreeMap<String, String>> for DittoHeaders {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<DittoHeaders> for BTreeMap<String, String> {
    fn from(headers: DittoHeaders) -> Self {
        headers.entries
    }
}

/// Builder with overwrite-on-put semantics.
#[derive(Debug, Clone, Default)]
pub struct DittoHeadersBuilder {
    entries: BTreeMap<String, String>,
}

impl DittoHeadersBuilder {
    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Put every pair in order. Later pairs win.
    pub fn put_all<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self = self.put(k, v);
        }
        self
    }

    /// Overlay another header set on top of the current entries.
    pub fn put_headers(self, headers: &DittoHeaders) -> Self {
        self.put_all(headers.iter())
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.entries.remove(&key.to_ascii_lowercase());
        self
    }

    pub fn correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.put(keys::CORRELATION_ID, correlation_id)
    }

    pub fn origin(self, origin: impl Into<String>) -> Self {
        self.put(keys::ORIGIN, origin)
    }

    pub fn source(self, source: impl Into<String>) -> Self {
        self.put(keys::SOURCE, source)
    }

    pub fn channel(self, channel: Channel) -> Self {
        self.put(keys::CHANNEL, channel.as_str())
    }

    pub fn response_required(self, required: bool) -> Self {
        self.put(keys::RESPONSE_REQUIRED, required.to_string())
    }

    pub fn schema_version(self, version: SchemaVersion) -> Self {
        self.put(keys::SCHEMA_VERSION, version.to_string())
    }

    pub fn thing_id(self, thing_id: impl Into<String>) -> Self {
        self.put(keys::THING_ID, thing_id)
    }

    pub fn authorization_context(self, context: &AuthorizationContext) -> Self {
        self.put(keys::AUTHORIZATION_SUBJECTS, context.to_json_array())
    }

    pub fn build(self) -> DittoHeaders {
        DittoHeaders {
            entries: self.entries,
        }
    }
}
