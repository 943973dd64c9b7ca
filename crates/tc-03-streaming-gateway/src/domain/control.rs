//! # Streaming Control Vocabulary
//!
//! Eight plain-text verbs toggle the four subscription channels of a
//! session:
//!
//! ```text
//! START-SEND-EVENTS          STOP-SEND-EVENTS
//! START-SEND-MESSAGES        STOP-SEND-MESSAGES
//! START-SEND-LIVE-COMMANDS   STOP-SEND-LIVE-COMMANDS
//! START-SEND-LIVE-EVENTS     STOP-SEND-LIVE-EVENTS
//! ```
//!
//! A `START-*` verb may carry `?namespaces=a,b&filter=<expr>`. Values are
//! form-URL-decoded. Parameters after a `STOP-*` verb are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;

pub const ACK_SUFFIX: &str = ":ACK";

const START_PREFIX: &str = "START-SEND-";
const STOP_PREFIX: &str = "STOP-SEND-";

/// The four independent subscription channels of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamingType {
    Events,
    Messages,
    LiveCommands,
    LiveEvents,
}

impl StreamingType {
    pub const ALL: [StreamingType; 4] = [
        StreamingType::Events,
        StreamingType::Messages,
        StreamingType::LiveCommands,
        StreamingType::LiveEvents,
    ];

    fn verb_suffix(&self) -> &'static str {
        match self {
            Self::Events => "EVENTS",
            Self::Messages => "MESSAGES",
            Self::LiveCommands => "LIVE-COMMANDS",
            Self::LiveEvents => "LIVE-EVENTS",
        }
    }

    fn from_verb_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.verb_suffix() == suffix)
    }

    /// Only event streams accept a filter expression.
    pub fn supports_filter(&self) -> bool {
        matches!(self, Self::Events | Self::LiveEvents)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Events => 0,
            Self::Messages => 1,
            Self::LiveCommands => 2,
            Self::LiveEvents => 3,
        }
    }

    /// The control verb that (un)subscribes this channel.
    pub fn verb(&self, start: bool) -> String {
        let prefix = if start { START_PREFIX } else { STOP_PREFIX };
        format!("{prefix}{}", self.verb_suffix())
    }
}

impl fmt::Display for StreamingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb_suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Start {
        streaming_type: StreamingType,
        namespaces: Vec<String>,
        filter: Option<String>,
    },
    Stop {
        streaming_type: StreamingType,
    },
}

impl ControlMessage {
    /// Parse a complete text payload. `None` means the payload is not a
    /// control message and should be treated as a signal envelope.
    pub fn parse(text: &str) -> Option<Self> {
        let (verb, query) = match text.split_once('?') {
            Some((verb, query)) => (verb, Some(query)),
            None => (text, None),
        };

        if let Some(suffix) = verb.strip_prefix(STOP_PREFIX) {
            let streaming_type = StreamingType::from_verb_suffix(suffix)?;
            return Some(Self::Stop { streaming_type });
        }

        let streaming_type = StreamingType::from_verb_suffix(verb.strip_prefix(START_PREFIX)?)?;
        let mut namespaces = Vec::new();
        let mut filter = None;

        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "namespaces" => {
                    namespaces = value
                        .split(',')
                        .map(str::trim)
                        .filter(|ns| !ns.is_empty())
                        .map(String::from)
                        .collect();
                }
                "filter" if streaming_type.supports_filter() && !value.is_empty() => {
                    filter = Some(value.into_owned());
                }
                _ => {}
            }
        }

        Some(Self::Start {
            streaming_type,
            namespaces,
            filter,
        })
    }

    pub fn streaming_type(&self) -> StreamingType {
        match self {
            Self::Start { streaming_type, .. } | Self::Stop { streaming_type } => *streaming_type,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start { .. })
    }

    pub fn verb(&self) -> String {
        self.streaming_type().verb(self.is_start())
    }
}

/// Acknowledgement of a processed control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingAck {
    pub streaming_type: StreamingType,
    pub subscribed: bool,
}

impl StreamingAck {
    pub fn for_control(control: &ControlMessage) -> Self {
        Self {
            streaming_type: control.streaming_type(),
            subscribed: control.is_start(),
        }
    }

    /// Wire form: the originating verb suffixed with `:ACK`.
    pub fn to_protocol_message(&self) -> String {
        format!("{}{ACK_SUFFIX}", self.streaming_type.verb(self.subscribed))
    }
}
