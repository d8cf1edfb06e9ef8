//! Session Cache - process-local shadow of decoded session histories.
//!
//! Write-through: the store updates an entry only after the session log
//! accepted the write, so a cached entry always equals what a fresh reload
//! would decode. Capacity-bounded with least-recently-used eviction;
//! dropping an entry only costs a reload.
//!
//! Entries holding migrated legacy messages are pinned: their ids were minted
//! by this decode and are not on disk yet, so a reload would mint new ones.
//! Pinned entries are never chosen for eviction; the next write replaces
//! them with an unpinned entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatmem_types::Message;

#[derive(Debug)]
struct CacheEntry {
    messages: Arc<Vec<Message>>,
    last_used: u64,
    pinned: bool,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Mapping session key -> decoded history, safe under concurrent access.
#[derive(Debug)]
pub struct SessionCache {
    /// Maximum number of unpinned sessions held; 0 means unbounded.
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl SessionCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    // Entries are plain data, so a panic elsewhere cannot leave them half-written.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached history for `session_key`, marking it recently used.
    #[must_use]
    pub fn get(&self, session_key: &str) -> Option<Arc<Vec<Message>>> {
        let mut inner = self.lock();
        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(session_key)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.messages))
    }

    /// Replace the entry for `session_key` wholesale.
    pub fn put(&self, session_key: &str, messages: Arc<Vec<Message>>) {
        self.insert(session_key, messages, false);
    }

    /// Like [`put`](Self::put), but the entry survives eviction until the
    /// next `put` for the same key.
    pub fn put_pinned(&self, session_key: &str, messages: Arc<Vec<Message>>) {
        self.insert(session_key, messages, true);
    }

    fn insert(&self, session_key: &str, messages: Arc<Vec<Message>>, pinned: bool) {
        let mut inner = self.lock();
        let tick = inner.next_tick();
        inner.entries.insert(
            session_key.to_string(),
            CacheEntry {
                messages,
                last_used: tick,
                pinned,
            },
        );

        if self.capacity == 0 {
            return;
        }
        // Pinned entries do not count against the capacity.
        while inner.entries.values().filter(|entry| !entry.pinned).count() > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .filter(|(_, entry)| !entry.pinned)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
            tracing::debug!(session_key = %oldest, "Evicted session from cache");
        }
    }

    #[must_use]
    pub fn is_pinned(&self, session_key: &str) -> bool {
        self.lock()
            .entries
            .get(session_key)
            .is_some_and(|entry| entry.pinned)
    }

    /// Drop the entry for `session_key`. Returns whether one existed.
    pub fn evict(&self, session_key: &str) -> bool {
        self.lock().entries.remove(session_key).is_some()
    }

    #[must_use]
    pub fn contains(&self, session_key: &str) -> bool {
        self.lock().entries.contains_key(session_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}

impl Default for SessionCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chatmem_types::{Message, Role};

    use super::SessionCache;

    fn history(text: &str) -> Arc<Vec<Message>> {
        Arc::new(vec![Message::create(Role::User, text, 1)])
    }

    #[test]
    fn get_absent_is_none() {
        let cache = SessionCache::unbounded();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn put_replaces_wholesale() {
        let cache = SessionCache::unbounded();
        cache.put("s1", history("first"));
        cache.put("s1", history("second"));

        let cached = cache.get("s1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].content(), "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_is_idempotent() {
        let cache = SessionCache::unbounded();
        cache.put("s1", history("x"));
        assert!(cache.evict("s1"));
        assert!(!cache.evict("s1"));
        assert!(cache.is_empty());
    }

    #[test]
    fn unbounded_cache_keeps_everything() {
        let cache = SessionCache::unbounded();
        for i in 0..500 {
            cache.put(&format!("s{i}"), history("x"));
        }
        assert_eq!(cache.len(), 500);
    }

    #[test]
    fn bounded_cache_evicts_least_recently_used() {
        let cache = SessionCache::new(2);
        cache.put("a", history("a"));
        cache.put("b", history("b"));
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.put("c", history("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn pinned_entries_are_not_evicted() {
        let cache = SessionCache::new(1);
        cache.put_pinned("legacy", history("migrated"));
        cache.put("a", history("a"));
        cache.put("b", history("b"));

        assert!(cache.contains("legacy"));
        assert!(cache.is_pinned("legacy"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn put_unpins_entry() {
        let cache = SessionCache::new(1);
        cache.put_pinned("legacy", history("migrated"));
        cache.put("legacy", history("rewritten"));
        assert!(!cache.is_pinned("legacy"));

        cache.put("other", history("x"));
        assert!(!cache.contains("legacy"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn explicit_evict_drops_pinned_entry() {
        let cache = SessionCache::new(1);
        cache.put_pinned("legacy", history("migrated"));
        assert!(cache.evict("legacy"));
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_access_is_safe() {
        let cache = Arc::new(SessionCache::new(8));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("s{}", (t * 100 + i) % 16);
                        cache.put(&key, history("x"));
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 8);
    }
}
