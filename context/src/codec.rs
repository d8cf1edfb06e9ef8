//! Encoding of a session's message sequence to and from its stored blob.
//!
//! The blob is a JSON array. Two element shapes exist on disk:
//!
//! ```text
//! current: { id, role: user|assistant|system, content, timestamp, metadata? }
//! legacy:  { role: user|ai, content }
//! ```
//!
//! Legacy elements are migrated on decode (fresh id, `ai` -> `assistant`,
//! stamped with the decode time). They are not rewritten on disk until the
//! session's next write.

use serde::Deserialize;

use chatmem_types::{Message, MessageId, Metadata, Role};

use crate::error::{MemoryError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoredRole {
    User,
    Ai,
    Assistant,
    System,
}

impl From<StoredRole> for Role {
    fn from(role: StoredRole) -> Self {
        match role {
            StoredRole::User => Role::User,
            StoredRole::Ai | StoredRole::Assistant => Role::Assistant,
            StoredRole::System => Role::System,
        }
    }
}

/// Either shape of a stored element. Presence of `id` decides which.
#[derive(Debug, Deserialize)]
struct StoredMessage {
    #[serde(default)]
    id: Option<MessageId>,
    role: StoredRole,
    content: String,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Result of decoding one session blob.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub messages: Vec<Message>,
    /// How many elements were in the legacy shape and got migrated.
    pub migrated: usize,
}

/// Decodes a stored blob, migrating legacy elements.
///
/// `None`, empty, whitespace-only and JSON `null` blobs are an empty history.
/// `now` (epoch millis) stamps migrated elements.
pub fn decode(session_key: &str, blob: Option<&str>, now: i64) -> Result<DecodeOutcome> {
    let Some(blob) = blob.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(DecodeOutcome {
            messages: Vec::new(),
            migrated: 0,
        });
    };

    let stored: Option<Vec<StoredMessage>> =
        serde_json::from_str(blob).map_err(|source| MemoryError::MalformedRecord {
            session_key: session_key.to_string(),
            source,
        })?;

    let mut migrated = 0;
    let messages = stored
        .unwrap_or_default()
        .into_iter()
        .map(|element| {
            let role = Role::from(element.role);
            match element.id {
                Some(id) => {
                    let message =
                        Message::new(id, role, element.content, element.timestamp.unwrap_or(now));
                    match element.metadata {
                        Some(metadata) => message.with_metadata(metadata),
                        None => message,
                    }
                }
                None => {
                    migrated += 1;
                    Message::create(role, element.content, now)
                }
            }
        })
        .collect();

    Ok(DecodeOutcome { messages, migrated })
}

/// Encodes current-format messages to the stored blob.
pub fn encode(session_key: &str, messages: &[Message]) -> Result<String> {
    serde_json::to_string(messages).map_err(|source| MemoryError::Encode {
        session_key: session_key.to_string(),
        source,
    })
}
