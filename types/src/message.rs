//! Conversation message model.
//!
//! A `Message` is one stored turn. Content is immutable once stored; the only
//! way history changes is append (with trimming) or clearing a whole session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::MessageId;

/// Open-ended key/value attachment (e.g. source model, reported token usage).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Error)]
#[error("unknown role '{0}'; expected one of: user, ai, assistant, system")]
pub struct UnknownRole(pub String);

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parses a role name, accepting the legacy `ai` spelling for `Assistant`.
    pub fn parse(raw: &str) -> Result<Self, UnknownRole> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(UnknownRole(raw.to_string())),
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversational turn in current (post-migration) form.
///
/// Serializes as `{ id, role, content, timestamp, metadata? }`, where
/// `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    metadata: Option<Metadata>,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, role: Role, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp,
            metadata: None,
        }
    }

    /// A new message with a freshly generated id.
    #[must_use]
    pub fn create(role: Role, content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageId::generate(), role, content, timestamp)
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// The `model` entry of the metadata, if it is a string.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("model"))
            .and_then(serde_json::Value::as_str)
    }

    /// Drops id, timestamp and metadata, keeping what a model prompt needs.
    #[must_use]
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The `{role, content}` projection handed to a language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}
