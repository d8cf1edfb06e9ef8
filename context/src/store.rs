//! Memory Store - read/write orchestration over log, cache and estimator.
//!
//! ```text
//! write: lock(key) -> load (cache | log+decode) -> append -> trim -> encode
//!        -> log.upsert -> cache.put
//! read:  cache hit | lock(key) -> log.fetch -> decode+migrate -> cache.put
//! smart: last SMART_CONTEXT_SCAN messages -> newest-first token budget scan
//! ```
//!
//! The log is written before the cache, so a failed persist leaves the cached
//! history equal to the durable one.

use std::path::PathBuf;
use std::sync::Arc;

use chatmem_types::{ChatTurn, Message, Metadata, Role, SessionKey};

use crate::codec;
use crate::error::Result;
use crate::key_locks::KeyedLocks;
use crate::session_cache::SessionCache;
use crate::session_log::{SessionLog, SessionStats, SessionWrite};
use crate::sqlite_util::now_millis;
use crate::token_counter::TokenCounter;

/// Retention cap: a session never holds more than this many messages.
pub const MAX_RETAINED_MESSAGES: usize = 50;

/// Upper bound on how much existing history one append reads back.
pub const LOAD_SOFT_LIMIT: usize = 1000;

/// How many recent messages the token-budget selection considers.
pub const SMART_CONTEXT_SCAN: usize = 100;

/// A fresh random session key for callers that did not supply one.
#[must_use]
pub fn generate_session_key() -> SessionKey {
    SessionKey::generate()
}

/// Per-session conversational memory.
#[derive(Debug)]
pub struct MemoryStore {
    log: SessionLog,
    cache: SessionCache,
    counter: TokenCounter,
    locks: KeyedLocks,
}

impl MemoryStore {
    #[must_use]
    pub fn new(log: SessionLog, cache: SessionCache) -> Self {
        Self {
            log,
            cache,
            counter: TokenCounter::new(),
            locks: KeyedLocks::new(),
        }
    }

    /// Open the store backed by the database file at `path`.
    ///
    /// `cache_capacity` bounds the session cache; 0 means unbounded.
    pub async fn open_at(path: impl Into<PathBuf>, cache_capacity: usize) -> Result<Self> {
        let log = SessionLog::open(path).await?;
        Ok(Self::new(log, SessionCache::new(cache_capacity)))
    }

    /// A store backed by an in-memory database (for testing).
    pub fn in_memory(cache_capacity: usize) -> Result<Self> {
        let log = SessionLog::open_in_memory()?;
        Ok(Self::new(log, SessionCache::new(cache_capacity)))
    }

    #[must_use]
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    async fn load(&self, key: &SessionKey) -> Result<Arc<Vec<Message>>> {
        if let Some(hit) = self.cache.get(key.as_str()) {
            return Ok(hit);
        }
        // A miss fills the cache under the session lock so a concurrent writer
        // cannot be overwritten by this reader's older snapshot.
        let _guard = self.locks.lock(key.as_str()).await;
        self.load_locked(key).await
    }

    /// Caller must hold the session lock.
    async fn load_locked(&self, key: &SessionKey) -> Result<Arc<Vec<Message>>> {
        if let Some(hit) = self.cache.get(key.as_str()) {
            tracing::trace!(session_key = %key, "Session cache hit");
            return Ok(hit);
        }

        let Some(blob) = self.log.fetch(key.as_str()).await? else {
            tracing::trace!(session_key = %key, "No stored history");
            return Ok(Arc::new(Vec::new()));
        };

        let decoded = codec::decode(key.as_str(), Some(&blob), now_millis())?;
        if decoded.migrated > 0 {
            tracing::info!(
                session_key = %key,
                migrated = decoded.migrated,
                "Migrated legacy messages on read"
            );
        }
        tracing::debug!(
            session_key = %key,
            count = decoded.messages.len(),
            "Loaded session into cache"
        );

        let messages = Arc::new(decoded.messages);
        if decoded.migrated > 0 {
            // Migrated ids exist only in this copy until the next write persists them.
            self.cache.put_pinned(key.as_str(), Arc::clone(&messages));
        } else {
            self.cache.put(key.as_str(), Arc::clone(&messages));
        }
        Ok(messages)
    }

    /// The last `window_size` messages of the session, oldest first.
    ///
    /// An unknown session yields an empty sequence.
    pub async fn get_messages(&self, key: &SessionKey, window_size: usize) -> Result<Vec<Message>> {
        let all = self.load(key).await?;
        let start = all.len().saturating_sub(window_size);
        Ok(all[start..].to_vec())
    }

    /// Append `message`, trim to `MAX_RETAINED_MESSAGES`, persist, then cache.
    ///
    /// Returns the stored message.
    pub async fn add_message(&self, key: &SessionKey, message: Message) -> Result<Message> {
        let _guard = self.locks.lock(key.as_str()).await;

        let existing = self.load_locked(key).await?;
        let keep_from = existing.len().saturating_sub(LOAD_SOFT_LIMIT);

        let mut next = Vec::with_capacity(existing.len() - keep_from + 1);
        next.extend_from_slice(&existing[keep_from..]);
        next.push(message.clone());
        if next.len() > MAX_RETAINED_MESSAGES {
            let dropped = next.len() - MAX_RETAINED_MESSAGES;
            next.drain(..dropped);
            tracing::debug!(session_key = %key, dropped, "Trimmed oldest messages");
        }

        let model = message.model().map(str::to_string);
        let added_tokens = self
            .counter
            .estimate_message(&message, model.as_deref().unwrap_or_default());
        let now = now_millis();

        self.log
            .upsert(SessionWrite {
                session_key: key.as_str().to_string(),
                messages: codec::encode(key.as_str(), &next)?,
                created_at: now,
                last_accessed_at: now,
                message_count: next.len(),
                added_tokens: u64::from(added_tokens),
                model,
            })
            .await?;

        tracing::debug!(
            session_key = %key,
            role = %message.role(),
            count = next.len(),
            "Stored message"
        );
        self.cache.put(key.as_str(), Arc::new(next));
        Ok(message)
    }

    /// Build a current-format message (fresh id, current time) and append it.
    pub async fn add_message_with_metadata(
        &self,
        key: &SessionKey,
        content: impl Into<String>,
        role: Role,
        metadata: Option<Metadata>,
    ) -> Result<Message> {
        let message = Message::create(role, content, now_millis());
        let message = match metadata {
            Some(metadata) => message.with_metadata(metadata),
            None => message,
        };
        self.add_message(key, message).await
    }

    /// The longest recent suffix of the session that fits `token_limit` for `model`.
    ///
    /// Considers at most the last `SMART_CONTEXT_SCAN` messages. The newest
    /// message is always included, even alone over budget, so a non-empty
    /// session never yields an empty context.
    pub async fn get_smart_context(
        &self,
        key: &SessionKey,
        token_limit: u32,
        model: &str,
    ) -> Result<Vec<Message>> {
        let recent = self.get_messages(key, SMART_CONTEXT_SCAN).await?;
        Ok(select_within_budget(
            self.counter,
            recent,
            token_limit,
            model,
        ))
    }

    /// `get_smart_context` projected to `{role, content}` turns.
    pub async fn format_for_ai(
        &self,
        key: &SessionKey,
        token_limit: u32,
        model: &str,
    ) -> Result<Vec<ChatTurn>> {
        let context = self.get_smart_context(key, token_limit, model).await?;
        Ok(context.iter().map(Message::to_turn).collect())
    }

    /// Delete the session's history from the log and the cache. Idempotent.
    ///
    /// Returns whether a stored record existed.
    pub async fn clear_memory(&self, key: &SessionKey) -> Result<bool> {
        let _guard = self.locks.lock(key.as_str()).await;
        let existed = self.log.delete(key.as_str()).await?;
        self.cache.evict(key.as_str());
        tracing::info!(session_key = %key, existed, "Cleared session memory");
        Ok(existed)
    }

    /// Bookkeeping for the session row, if it exists.
    pub async fn session_stats(&self, key: &SessionKey) -> Result<Option<SessionStats>> {
        self.log.stats(key.as_str()).await
    }
}

/// Newest-first scan keeping messages while the running total stays within
/// `token_limit`; stops at the first message that would exceed it. Output is
/// oldest first.
fn select_within_budget(
    counter: TokenCounter,
    recent: Vec<Message>,
    token_limit: u32,
    model: &str,
) -> Vec<Message> {
    let mut total: u32 = 0;
    let mut selected = Vec::new();

    for message in recent.into_iter().rev() {
        let tokens = counter.estimate_message(&message, model);
        let next_total = total.saturating_add(tokens);
        if !selected.is_empty() && next_total > token_limit {
            break;
        }
        total = next_total;
        selected.push(message);
    }

    selected.reverse();
    selected
}
