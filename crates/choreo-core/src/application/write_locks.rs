use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key, created on first use
///
/// An entry lives only while some task holds or waits for its lock, so the
/// map stays as small as the set of records being written right now.
pub struct WriteLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> WriteLocks<K> {
    /// Empty lock table
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &K) -> WriteGuard<'_, K> {
        // the clone is taken under the shard lock, so a concurrent release
        // sees it in the strong count and keeps the entry
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        WriteGuard {
            owner: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Keys with a live lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when nobody holds or waits for a lock
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// True while some task holds or waits for `key`
    pub fn contains(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }
}

impl<K: Eq + Hash + Clone> Default for WriteLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key; dropping it releases the lock
pub struct WriteGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a WriteLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for WriteGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
