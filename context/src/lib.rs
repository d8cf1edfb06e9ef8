//! Per-session conversational memory.
//!
//! This crate provides:
//! - Token estimation via tiktoken with a length-based fallback
//! - Encoding/decoding of stored message sequences, including legacy migration
//! - A SQLite-backed session log with versioned schema upgrades
//! - A bounded in-process session cache
//! - `MemoryStore`, which composes the above
//!
//! # Architecture
//!
//! ```text
//! MemoryStore
//! ├── log: SessionLog (durable, source of truth)
//! ├── cache: SessionCache (write-through shadow, LRU)
//! ├── counter: TokenCounter (tiktoken / chars÷4)
//! └── locks: KeyedLocks (per-session write serialization)
//! ```

mod codec;
mod error;
mod key_locks;
mod session_cache;
mod session_log;
mod sqlite_util;
mod store;
mod token_counter;

pub use codec::{DecodeOutcome, decode, encode};
pub use error::{MemoryError, Result};
pub use session_cache::SessionCache;
pub use session_log::{SCHEMA_VERSION, SessionLog, SessionStats, SessionWrite};
pub use store::{
    LOAD_SOFT_LIMIT, MAX_RETAINED_MESSAGES, MemoryStore, SMART_CONTEXT_SCAN, generate_session_key,
};
pub use token_counter::TokenCounter;
