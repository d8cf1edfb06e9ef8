//! Payload sniffing for the auto-store operations.
//!
//! Upstream items come from arbitrary chat triggers and model nodes, so the
//! text lives under whichever key that producer happened to use. Lookups go
//! through a fixed key order and take the first non-blank string.

use serde_json::Value;

use chatmem_types::Metadata;

const USER_TEXT_KEYS: &[&str] = &[
    "chatInput",
    "message",
    "text",
    "query",
    "input",
    "prompt",
    "question",
    "content",
];

const USER_TEXT_POINTERS: &[&str] = &["/message/content", "/message/text"];

const AI_TEXT_KEYS: &[&str] = &[
    "output",
    "response",
    "text",
    "answer",
    "content",
    "result",
    "completion",
];

// OpenAI chat, OpenAI legacy completion, then single-message shapes.
const AI_TEXT_POINTERS: &[&str] = &[
    "/choices/0/message/content",
    "/choices/0/text",
    "/message/content",
];

const AI_METADATA_KEYS: &[&str] = &["model", "usage"];

/// A model reply pulled out of an upstream payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AiReply {
    pub content: String,
    pub metadata: Option<Metadata>,
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

fn first_text<'a>(payload: &'a Value, keys: &[&str], pointers: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| non_blank(payload.get(key)))
        .or_else(|| {
            pointers
                .iter()
                .find_map(|pointer| non_blank(payload.pointer(pointer)))
        })
        .or_else(|| non_blank(Some(payload)))
}

/// The user's message text, if the payload carries one.
#[must_use]
pub fn extract_user_text(payload: &Value) -> Option<String> {
    first_text(payload, USER_TEXT_KEYS, USER_TEXT_POINTERS).map(str::to_string)
}

/// The model's reply text plus `model`/`usage` metadata when present.
#[must_use]
pub fn extract_ai_reply(payload: &Value) -> Option<AiReply> {
    let content = first_text(payload, AI_TEXT_KEYS, AI_TEXT_POINTERS)?.to_string();

    let metadata: Metadata = AI_METADATA_KEYS
        .iter()
        .filter_map(|key| {
            payload
                .get(key)
                .filter(|value| !value.is_null())
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect();

    Some(AiReply {
        content,
        metadata: (!metadata.is_empty()).then_some(metadata),
    })
}
