//! Per-session write serialization.
//!
//! Appends are read-modify-write over the whole retained history, so two
//! unserialized appends to one session would each read the old sequence and
//! the later upsert would drop the earlier message. Writers take the
//! session's lock for the duration; different sessions never contend.
//! Locks for sessions with no holder or waiter are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, KeyLock>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive write access to `key`.
    pub(crate) async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = Arc::clone(self.table().entry(key.to_string()).or_default());
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table().len()
    }
}

/// Held while writing one session. Releases on drop.
pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.owner.table();
        if let Some(lock) = table.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            table.remove(&self.key);
        }
    }
}
