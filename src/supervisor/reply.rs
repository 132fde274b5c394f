// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Response shapes returned by the agent server control API.
//!
//! The server answers prompts and history queries in a few different shapes.
//! Each is an explicit variant here, and [`ReplyPayload::text`] handles every
//! variant.

use serde::Deserialize;
use serde_json::Value;

/// Text returned when polling ends without any reply text.
pub const NO_REPLY: &str = "No messages";

/// A prompt or history response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplyPayload {
    /// A bare list of messages.
    Messages(Vec<MessageRow>),
    /// `{ "data": [...] }`
    Wrapped { data: Vec<MessageRow> },
    /// A single message with top-level `parts`.
    Single(SingleMessage),
    /// Anything else; carries no text.
    Other(Value),
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageRow {
    #[serde(default)]
    pub info: Option<MessageInfo>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A single message; unlike [`MessageRow`] the `parts` field is required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SingleMessage {
    #[serde(default)]
    pub info: Option<MessageInfo>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub role: Option<String>,
}

/// A message part. Only string `text` or `value` fields carry reply text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    Value { value: String },
    Opaque(Value),
}

impl Part {
    fn fragment(&self) -> Option<&str> {
        match self {
            Part::Text { text } if !text.is_empty() => Some(text),
            Part::Value { value } if !value.is_empty() => Some(value),
            _ => None,
        }
    }
}

impl ReplyPayload {
    /// Parse a raw JSON value. Never fails; unknown shapes become `Other`.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(ReplyPayload::Other(value))
    }

    /// Messages carried by this payload, in order.
    fn rows(&self) -> Vec<(Option<&MessageInfo>, &[Part])> {
        match self {
            ReplyPayload::Messages(rows) | ReplyPayload::Wrapped { data: rows } => rows
                .iter()
                .map(|r| (r.info.as_ref(), r.parts.as_slice()))
                .collect(),
            ReplyPayload::Single(msg) => vec![(msg.info.as_ref(), msg.parts.as_slice())],
            ReplyPayload::Other(_) => Vec::new(),
        }
    }

    /// Concatenated reply text, or `None` if there is none.
    ///
    /// Fragments are joined with newlines and the result is trimmed. Messages
    /// whose role is `user` are skipped so an echoed prompt is not mistaken
    /// for a reply.
    pub fn text(&self) -> Option<String> {
        let joined = self
            .rows()
            .into_iter()
            .filter(|(info, _)| {
                info.and_then(|i| i.role.as_deref())
                    .map_or(true, |role| role != "user")
            })
            .flat_map(|(_, parts)| parts.iter().filter_map(Part::fragment))
            .collect::<Vec<_>>()
            .join("\n");

        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Response to session creation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SessionCreated {
    /// `{ "id": ... }`
    Direct { id: String },
    /// `{ "session": { "id": ... } }`
    Nested { session: SessionRef },
    /// `{ "data": { "id": ... } }`
    Wrapped { data: SessionRef },
    /// `{ "data": { "session": { "id": ... } } }`
    WrappedNested { data: NestedSession },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NestedSession {
    pub session: SessionRef,
}

impl SessionCreated {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(SessionCreated::Other(value))
    }

    /// The created session id, if the response carried a usable one.
    pub fn session_id(&self) -> Option<&str> {
        let id = match self {
            SessionCreated::Direct { id } => id,
            SessionCreated::Nested { session } | SessionCreated::Wrapped { data: session } => {
                &session.id
            }
            SessionCreated::WrappedNested { data } => &data.session.id,
            SessionCreated::Other(_) => return None,
        };
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }
}
