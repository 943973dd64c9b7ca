//! # Authorization Context
//!
//! Ordered set of subject identifiers an inbound message is authorized as.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single authorization subject such as `integration:tenant-a` or
/// `nginx:alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationSubject(String);

impl AuthorizationSubject {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorizationSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, duplicate-free list of subjects.
///
/// Insertion order is significant: the first subject becomes the `source`
/// header of normalized messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationContext {
    subjects: Vec<AuthorizationSubject>,
}

impl AuthorizationContext {
    /// Build a context, dropping blank ids and later duplicates.
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<AuthorizationSubject> = Vec::new();
        for id in subjects {
            let id = id.into();
            let id = id.trim();
            if id.is_empty() || ordered.iter().any(|s| s.id() == id) {
                continue;
            }
            ordered.push(AuthorizationSubject::new(id));
        }
        Self { subjects: ordered }
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn first(&self) -> Option<&AuthorizationSubject> {
        self.subjects.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthorizationSubject> {
        self.subjects.iter()
    }

    /// Encode the subject ids as a JSON array string, e.g. `["a:b","c:d"]`.
    ///
    /// This is the wire form of the `authorization-subjects` header.
    pub fn to_json_array(&self) -> String {
        serde_json::Value::Array(
            self.subjects
                .iter()
                .map(|s| serde_json::Value::String(s.id().to_string()))
                .collect(),
        )
        .to_string()
    }

    /// Parse the `authorization-subjects` header form back into a context.
    pub fn from_json_array(encoded: &str) -> Result<Self, serde_json::Error> {
        let ids: Vec<String> = serde_json::from_str(encoded)?;
        Ok(Self::new(ids))
    }
}

impl<'a> IntoIterator for &'a AuthorizationContext {
    type Item = &'a AuthorizationSubject;
    type IntoIter = std::slice::Iter<'a, AuthorizationSubject>;

    fn into_iter(self) -> Self::IntoIter {
        self.subjects.iter()
    }
}
