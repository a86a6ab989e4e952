//! Fixed pool of async mutexes addressed by key hash.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use tokio::sync::{Mutex, MutexGuard};

/// Serializes work per key without keeping one lock per key alive.
///
/// Distinct keys may share a stripe; that only costs some concurrency.
pub struct LockStripes {
    stripes: Box<[Mutex<()>]>,
}

impl LockStripes {
    /// Pool of `count` stripes (at least one).
    pub fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Wait for the stripe owning `key`.
    pub async fn lock<K: Hash + ?Sized>(&self, key: &K) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}
