//! Write-once memo table shared by concurrent requesters.
//!
//! The first requester of a key runs the initializer; concurrent requesters
//! of the same key await the same in-flight cell. Once set, a value is never
//! replaced for the lifetime of the map.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Memo table keyed by `K`
#[derive(Debug)]
pub struct OnceMap<K, V>
where
    K: Eq + Hash,
{
    cells: DashMap<K, Arc<OnceCell<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get the value for `key`, running `init` if no requester has yet
    pub async fn get_or_init<F, Fut>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        // Clone the cell out so no map shard lock is held across the await
        let cell = self.cells.entry(key).or_default().value().clone();

        if let Some(value) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value.clone();
        }

        let mut initialized_here = false;
        let value = cell
            .get_or_init(|| {
                initialized_here = true;
                init()
            })
            .await;

        if initialized_here {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value.clone()
    }

    /// Value for `key` if it has been set
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cells.get(key).is_some_and(|cell| cell.initialized())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cells.iter().filter(|cell| cell.initialized()).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of settled entries
    pub entries: usize,
    /// Requests answered from an existing or in-flight cell
    pub hits: u64,
    /// Requests that ran the initializer
    pub misses: u64,
}

#[cfg(test)]
mod tests;
