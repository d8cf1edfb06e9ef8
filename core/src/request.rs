//! Request items: one JSON object per operation call.

use serde_json::{Map, Value};

use chatmem_types::{Metadata, Role, SessionKey};

use crate::error::DispatchError;

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_TOKEN_LIMIT: u32 = 4000;
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPERATION: &str = "getMessages";

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    GetMessages {
        window_size: usize,
    },
    AddMessage {
        role: Role,
        content: String,
        metadata: Option<Metadata>,
    },
    AutoStoreUser {
        payload: Value,
    },
    AutoStoreAi {
        payload: Value,
    },
    FormatForAi {
        token_limit: u32,
        model: String,
    },
    SmartContext {
        token_limit: u32,
        model: String,
    },
    ClearMemory,
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetMessages { .. } => "getMessages",
            Operation::AddMessage { .. } => "addMessage",
            Operation::AutoStoreUser { .. } => "autoStoreUser",
            Operation::AutoStoreAi { .. } => "autoStoreAI",
            Operation::FormatForAi { .. } => "formatForAI",
            Operation::SmartContext { .. } => "smartContext",
            Operation::ClearMemory => "clearMemory",
        }
    }
}

/// A parsed request item. A missing or blank `sessionKey` has already been
/// replaced by a generated one.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub session_key: SessionKey,
    pub operation: Operation,
}

impl Request {
    pub fn parse(item: &Value) -> Result<Self, DispatchError> {
        let Some(fields) = item.as_object() else {
            return Err(DispatchError::invalid("item", "expected a JSON object"));
        };

        let session_key = SessionKey::or_generate(optional_str(fields, "sessionKey")?);
        let name = optional_str(fields, "operation")?.unwrap_or(DEFAULT_OPERATION);

        let operation = match name {
            "getMessages" => Operation::GetMessages {
                window_size: optional_usize(fields, "windowSize")?.unwrap_or(DEFAULT_WINDOW_SIZE),
            },
            "addMessage" => {
                let role = match optional_str(fields, "role")? {
                    Some(raw) => {
                        Role::parse(raw).map_err(|err| DispatchError::invalid("role", err.to_string()))?
                    }
                    None => Role::User,
                };
                let content = match fields.get("content") {
                    Some(Value::String(content)) => content.clone(),
                    None | Some(Value::Null) => return Err(DispatchError::MissingField("content")),
                    Some(_) => return Err(DispatchError::invalid("content", "expected a string")),
                };
                let metadata = match fields.get("metadata") {
                    Some(Value::Object(map)) => Some(map.clone()),
                    None | Some(Value::Null) => None,
                    Some(_) => return Err(DispatchError::invalid("metadata", "expected an object")),
                };
                Operation::AddMessage {
                    role,
                    content,
                    metadata,
                }
            }
            "autoStoreUser" => Operation::AutoStoreUser {
                payload: payload_of(item, fields),
            },
            "autoStoreAI" => Operation::AutoStoreAi {
                payload: payload_of(item, fields),
            },
            "formatForAI" => Operation::FormatForAi {
                token_limit: token_limit(fields)?,
                model: model(fields)?,
            },
            "smartContext" => Operation::SmartContext {
                token_limit: token_limit(fields)?,
                model: model(fields)?,
            },
            "clearMemory" => Operation::ClearMemory,
            other => return Err(DispatchError::UnknownOperation(other.to_string())),
        };

        Ok(Self {
            session_key,
            operation,
        })
    }
}

// An explicit `payload` wins; otherwise the whole item is the payload.
fn payload_of(item: &Value, fields: &Map<String, Value>) -> Value {
    match fields.get("payload") {
        Some(payload) if !payload.is_null() => payload.clone(),
        _ => item.clone(),
    }
}

fn optional_str<'a>(
    fields: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, DispatchError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw.as_str())),
        Some(_) => Err(DispatchError::invalid(field, "expected a string")),
    }
}

fn optional_u64(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u64>, DispatchError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| DispatchError::invalid(field, "expected a non-negative integer")),
    }
}

fn optional_usize(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<usize>, DispatchError> {
    optional_u64(fields, field)?
        .map(|value| usize::try_from(value).map_err(|err| DispatchError::invalid(field, err.to_string())))
        .transpose()
}

fn token_limit(fields: &Map<String, Value>) -> Result<u32, DispatchError> {
    optional_u64(fields, "tokenLimit")?
        .map(|value| {
            u32::try_from(value).map_err(|err| DispatchError::invalid("tokenLimit", err.to_string()))
        })
        .transpose()
        .map(|limit| limit.unwrap_or(DEFAULT_TOKEN_LIMIT))
}

fn model(fields: &Map<String, Value>) -> Result<String, DispatchError> {
    Ok(optional_str(fields, "model")?
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string())
}
