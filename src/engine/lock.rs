use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

/// Per-key exclusive locks.
///
/// Callers for the same key run one at a time; different keys only share a
/// map shard for the instant it takes to fetch their mutex. An entry is
/// dropped once nobody holds or waits on it, so the map only ever contains
/// keys with work in flight.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        // Declared first so it runs last, after our handle and guard are gone,
        // even when `f` unwinds.
        let _release = Release {
            locks: &self.locks,
            key,
        };
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // A panic under the lock leaves no in-memory state behind: the
        // record lives in the store, so a poisoned mutex is still usable.
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of keys with a caller in flight.
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Drops the map entry for `key` once nobody else holds or waits on it.
struct Release<'a, K: Eq + Hash> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: &'a K,
}

impl<K: Eq + Hash> Drop for Release<'_, K> {
    fn drop(&mut self) {
        self.locks
            .remove_if(self.key, |_, entry| Arc::strong_count(entry) == 1);
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
