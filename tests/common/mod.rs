//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};

use chatmem_config::MemoryConfig;
use chatmem_context::MemoryStore;
use chatmem_core::{Dispatcher, open_store};

/// Not a tiktoken model, so token estimates are ceil(chars / 4).
pub const FALLBACK_MODEL: &str = "test-model";

pub fn in_memory_dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(
        MemoryStore::in_memory(0).expect("in-memory store opens"),
    ))
}

pub async fn dispatcher_at(dir: &Path) -> Dispatcher {
    let store = open_store(&MemoryConfig::at(dir))
        .await
        .expect("on-disk store opens");
    Dispatcher::new(Arc::new(store))
}

pub fn add(session_key: &str, role: &str, content: &str) -> Value {
    json!({
        "operation": "addMessage",
        "sessionKey": session_key,
        "role": role,
        "content": content
    })
}

pub fn get(session_key: &str, window_size: usize) -> Value {
    json!({
        "operation": "getMessages",
        "sessionKey": session_key,
        "windowSize": window_size
    })
}

pub fn contents(result: &Value) -> Vec<String> {
    result["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .filter_map(|message| message["content"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
