//! # Placeholder Resolver
//!
//! Templates contain tokens of the form `{{ prefix:name }}`; whitespace inside
//! the braces is ignored. Each [`Placeholder`] owns one prefix and resolves
//! names against one kind of source:
//!
//! | Prefix   | Source          | Names |
//! |----------|-----------------|-------|
//! | `header` | headers         | any header key |
//! | `thing`  | entity id       | `id`, `namespace`, `name` |
//! | `topic`  | topic path      | `full`, `namespace`, `entityId`, `group`, `channel`, `criterion`, `action`, `subject` |
//! | `source` | source address  | `address` |
//!
//! Resolution is done one source at a time. [`resolve_permissive`] leaves any
//! token it cannot resolve in place so a later pass against another source
//! can complete it. [`resolve_strict`] fails if any token survives.

use shared_types::envelope::Criterion;
use shared_types::signal::split_namespaced_id;
use shared_types::{DittoHeaders, TopicPath};
use std::collections::BTreeMap;
use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("The placeholder <{placeholder}> in <{template}> could not be resolved")]
    Unresolved {
        template: String,
        placeholder: String,
    },
}

pub trait Placeholder<T: ?Sized> {
    fn prefix(&self) -> &'static str;

    /// `None` both for unknown names and for names without a value.
    fn resolve(&self, source: &T, name: &str) -> Option<String>;
}

pub struct HeadersPlaceholder;

impl Placeholder<DittoHeaders> for HeadersPlaceholder {
    fn prefix(&self) -> &'static str {
        "header"
    }

    fn resolve(&self, source: &DittoHeaders, name: &str) -> Option<String> {
        source.get(name).map(str::to_string)
    }
}

impl Placeholder<BTreeMap<String, String>> for HeadersPlaceholder {
    fn prefix(&self) -> &'static str {
        "header"
    }

    fn resolve(&self, source: &BTreeMap<String, String>, name: &str) -> Option<String> {
        source
            .get(name)
            .or_else(|| {
                source
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .cloned()
    }
}

/// Resolves against a namespaced entity id such as `ditto:thing`.
pub struct ThingPlaceholder;

impl Placeholder<str> for ThingPlaceholder {
    fn prefix(&self) -> &'static str {
        "thing"
    }

    fn resolve(&self, source: &str, name: &str) -> Option<String> {
        match name {
            "id" => Some(source.to_string()),
            "namespace" => split_namespaced_id(source).map(|(ns, _)| ns.to_string()),
            "name" => split_namespaced_id(source).map(|(_, n)| n.to_string()),
            _ => None,
        }
    }
}

pub struct TopicPathPlaceholder;

impl Placeholder<TopicPath> for TopicPathPlaceholder {
    fn prefix(&self) -> &'static str {
        "topic"
    }

    fn resolve(&self, source: &TopicPath, name: &str) -> Option<String> {
        match name {
            "full" => Some(source.full()),
            "namespace" => Some(source.namespace.clone()),
            "entityId" => Some(source.entity_name.clone()),
            "group" => Some(source.group.clone()),
            "channel" => Some(source.channel.to_string()),
            "criterion" => Some(source.criterion.as_str().to_string()),
            "action" if source.criterion != Criterion::Messages => source.action.clone(),
            "subject" if source.criterion == Criterion::Messages => source.action.clone(),
            _ => None,
        }
    }
}

/// Resolves against the address a message was consumed from.
pub struct SourceAddressPlaceholder;

impl Placeholder<str> for SourceAddressPlaceholder {
    fn prefix(&self) -> &'static str {
        "source"
    }

    fn resolve(&self, source: &str, name: &str) -> Option<String> {
        match name {
            "address" => Some(source.to_string()),
            _ => None,
        }
    }
}

/// One lexical piece of a template.
enum Piece<'a> {
    Literal(&'a str),
    Token {
        raw: &'a str,
        prefix: &'a str,
        name: &'a str,
    },
}

fn tokenize(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        let Some(len) = rest[start + OPEN.len()..].find(CLOSE) else {
            break;
        };
        if start > 0 {
            pieces.push(Piece::Literal(&rest[..start]));
        }
        let end = start + OPEN.len() + len + CLOSE.len();
        let raw = &rest[start..end];
        let inner = rest[start + OPEN.len()..start + OPEN.len() + len].trim();
        match inner.split_once(':') {
            Some((prefix, name)) => pieces.push(Piece::Token {
                raw,
                prefix: prefix.trim(),
                name: name.trim(),
            }),
            None => pieces.push(Piece::Literal(raw)),
        }
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    pieces
}

/// Substitute every token of `placeholder`'s prefix that resolves. All other
/// text, including unresolvable tokens, is kept verbatim.
pub fn resolve_permissive<T, P>(template: &str, source: &T, placeholder: &P) -> String
where
    T: ?Sized,
    P: Placeholder<T>,
{
    let mut out = String::with_capacity(template.len());
    for piece in tokenize(template) {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Token { raw, prefix, name } => {
                let resolved = (prefix == placeholder.prefix())
                    .then(|| placeholder.resolve(source, name))
                    .flatten();
                out.push_str(resolved.as_deref().unwrap_or(raw));
            }
        }
    }
    out
}

/// Like [`resolve_permissive`], but any token left over, whatever its
/// prefix, is an error.
pub fn resolve_strict<T, P>(
    template: &str,
    source: &T,
    placeholder: &P,
) -> Result<String, PlaceholderError>
where
    T: ?Sized,
    P: Placeholder<T>,
{
    let resolved = resolve_permissive(template, source, placeholder);
    ensure_resolved(&resolved)
}

/// Fail with the first remaining token, if any.
pub fn ensure_resolved(template: &str) -> Result<String, PlaceholderError> {
    for piece in tokenize(template) {
        if let Piece::Token { raw, .. } = piece {
            return Err(PlaceholderError::Unresolved {
                template: template.to_string(),
                placeholder: raw.to_string(),
            });
        }
    }
    Ok(template.to_string())
}

pub fn contains_placeholder(template: &str) -> bool {
    tokenize(template)
        .iter()
        .any(|piece| matches!(piece, Piece::Token { .. }))
}
