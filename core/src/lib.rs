//! Operation surface for the chat memory store.
//!
//! Callers hand in loosely-shaped JSON request items; this crate parses them
//! into typed [`Request`]s, sniffs free-form payloads for the auto-store
//! operations, and maps each onto a [`MemoryStore`] call.

mod dispatch;
mod error;
mod extract;
mod request;

pub use dispatch::Dispatcher;
pub use error::DispatchError;
pub use extract::{AiReply, extract_ai_reply, extract_user_text};
pub use request::{
    DEFAULT_MODEL, DEFAULT_OPERATION, DEFAULT_TOKEN_LIMIT, DEFAULT_WINDOW_SIZE, Operation, Request,
};

use chatmem_config::MemoryConfig;
use chatmem_context::{MemoryError, MemoryStore};

/// Open the store described by `config`.
pub async fn open_store(config: &MemoryConfig) -> Result<MemoryStore, MemoryError> {
    tracing::info!(
        path = %config.db_path().display(),
        cache_capacity = config.cache_capacity,
        "Opening memory store"
    );
    MemoryStore::open_at(config.db_path(), config.cache_capacity).await
}
