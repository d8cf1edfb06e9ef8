//! Request dispatch: parsed item -> store call -> JSON result.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use chatmem_context::MemoryStore;
use chatmem_types::{ChatTurn, Message, Role, SessionKey};

use crate::error::DispatchError;
use crate::extract::{AiReply, extract_ai_reply, extract_user_text};
use crate::request::{Operation, Request};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessagesResult<'a> {
    messages: Vec<Message>,
    session_key: &'a SessionKey,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_limit: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredResult<'a> {
    success: bool,
    session_key: &'a SessionKey,
    message: Message,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormattedResult<'a> {
    messages: Vec<ChatTurn>,
    session_key: &'a SessionKey,
    token_limit: u32,
    model: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearedResult<'a> {
    success: bool,
    session_key: &'a SessionKey,
    cleared: bool,
}

fn to_value(result: &impl Serialize) -> Result<Value, DispatchError> {
    serde_json::to_value(result).map_err(DispatchError::EncodeResult)
}

fn not_stored(err: &DispatchError) -> Value {
    json!({ "success": false, "error": err.to_string() })
}

/// Maps request items onto one shared [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<MemoryStore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Parse and execute one request item.
    pub async fn execute(&self, item: &Value) -> Result<Value, DispatchError> {
        let request = Request::parse(item)?;
        self.handle(request).await
    }

    pub async fn handle(&self, request: Request) -> Result<Value, DispatchError> {
        let Request {
            session_key: key,
            operation,
        } = request;
        tracing::debug!(session_key = %key, operation = operation.name(), "Dispatching");

        match operation {
            Operation::GetMessages { window_size } => {
                let messages = self.store.get_messages(&key, window_size).await?;
                to_value(&MessagesResult {
                    count: messages.len(),
                    messages,
                    session_key: &key,
                    token_limit: None,
                })
            }
            Operation::AddMessage {
                role,
                content,
                metadata,
            } => {
                let message = self
                    .store
                    .add_message_with_metadata(&key, content, role, metadata)
                    .await?;
                to_value(&StoredResult {
                    success: true,
                    session_key: &key,
                    message,
                })
            }
            Operation::AutoStoreUser { payload } => {
                let Some(text) = extract_user_text(&payload) else {
                    return Ok(not_stored(&DispatchError::NothingToStore("user")));
                };
                let message = self
                    .store
                    .add_message_with_metadata(&key, text, Role::User, None)
                    .await?;
                to_value(&StoredResult {
                    success: true,
                    session_key: &key,
                    message,
                })
            }
            Operation::AutoStoreAi { payload } => {
                let Some(AiReply { content, metadata }) = extract_ai_reply(&payload) else {
                    return Ok(not_stored(&DispatchError::NothingToStore("AI")));
                };
                let message = self
                    .store
                    .add_message_with_metadata(&key, content, Role::Assistant, metadata)
                    .await?;
                to_value(&StoredResult {
                    success: true,
                    session_key: &key,
                    message,
                })
            }
            Operation::FormatForAi { token_limit, model } => {
                let messages = self.store.format_for_ai(&key, token_limit, &model).await?;
                to_value(&FormattedResult {
                    messages,
                    session_key: &key,
                    token_limit,
                    model: &model,
                })
            }
            Operation::SmartContext { token_limit, model } => {
                let messages = self
                    .store
                    .get_smart_context(&key, token_limit, &model)
                    .await?;
                to_value(&MessagesResult {
                    count: messages.len(),
                    messages,
                    session_key: &key,
                    token_limit: Some(token_limit),
                })
            }
            Operation::ClearMemory => {
                self.store.clear_memory(&key).await?;
                to_value(&ClearedResult {
                    success: true,
                    session_key: &key,
                    cleared: true,
                })
            }
        }
    }

    /// Execute `items` in order, one result per item.
    ///
    /// With `continue_on_fail`, a failing item yields `{"error": message}` in
    /// its slot and later items still run. Otherwise the first failure aborts.
    pub async fn run(
        &self,
        items: &[Value],
        continue_on_fail: bool,
    ) -> Result<Vec<Value>, DispatchError> {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.execute(item).await {
                Ok(result) => results.push(result),
                Err(err) if continue_on_fail => {
                    tracing::warn!(index, error = %err, "Request item failed; continuing");
                    results.push(json!({ "error": err.to_string() }));
                }
                Err(err) => {
                    tracing::error!(index, error = %err, "Request item failed");
                    return Err(err);
                }
            }
        }
        Ok(results)
    }
}
