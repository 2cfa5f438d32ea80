//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// A set of async locks, one per key, created on demand.
///
/// Holders of different keys never contend. Entries are dropped again once
/// nobody holds or waits on them.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    /// Creates an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free, then holds it until the guard is dropped.
    ///
    /// Cancelling the wait releases the entry just as dropping the guard does.
    pub async fn acquire(&self, key: K) -> KeyedGuard<'_, K> {
        // Declared before the wait so it outlives the pending lock future and
        // cleans up after it if the caller gives up.
        let mut pending = KeyedGuard {
            locks: self,
            key,
            guard: None,
        };
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(pending.key.clone()).or_default())
        };
        pending.guard = Some(slot.lock_owned().await);
        trace!(key = ?pending.key, "Key acquired");
        pending
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no key is held or awaited.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one key of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash,
{
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own reference left: nobody holds or waits on this key.
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
    }
}
