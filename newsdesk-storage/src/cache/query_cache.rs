//! Thread-safe query cache shared by every request handler and session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::bounded::BoundedCache;

/// Default maximum number of cached queries.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Configuration for a [`QueryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of distinct keys held at once.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries removed by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// [`BoundedCache`] keyed by query strings, safe to share across threads.
///
/// Every operation takes the internal mutex for the duration of one map
/// operation only; no lock is held while a caller computes a missing value.
#[derive(Debug)]
pub struct QueryCache<V> {
    inner: Mutex<BoundedCache<String, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(BoundedCache::new(config.capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&CacheConfig::new().with_capacity(capacity))
    }

    /// Get a clone of the cached value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.lock().get(key).cloned();
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Store `value` under `key`, evicting the oldest entry if the cache is full.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let evicted = self.lock().set(key.into(), value);
        if let Some(entry) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %entry.key, "Evicted oldest cache entry");
        }
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with<F>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone());
        value
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every key starting with `prefix`. Returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = self.lock().remove_prefix(prefix);
        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        let mut cache = self.lock();
        self.invalidations
            .fetch_add(cache.len() as u64, Ordering::Relaxed);
        cache.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedCache<String, V>> {
        // Map operations never leave the cache half-updated; poisoning is benign.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_get_counts_hits_and_misses() {
        let cache = QueryCache::with_capacity(2);
        assert_eq!(cache.get("a"), None::<u32>);
        cache.set("a", 1);
        assert_eq!(cache.get("a"), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_eviction_is_counted() {
        let cache = QueryCache::with_capacity(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = QueryCache::with_capacity(4);
        let mut calls = 0;
        let first = cache.get_or_insert_with("page:1", || {
            calls += 1;
            vec![1, 2, 3]
        });
        let second = cache.get_or_insert_with("page:1", || {
            calls += 1;
            vec![9]
        });

        assert_eq!(first, second);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalidate_prefix_counts_removed_entries() {
        let cache = QueryCache::with_capacity(4);
        cache.set("article:a", 1);
        cache.set("article:b", 2);
        cache.set("user:a", 3);

        assert_eq!(cache.invalidate_prefix("article:"), 2);
        assert!(!cache.invalidate("article:a"));
        assert!(cache.invalidate("user:a"));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(QueryCache::with_capacity(16));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..8 {
                        cache.set(format!("t{}:{}", t, i), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        assert_eq!(cache.len(), 16);
        assert_eq!(cache.stats().evictions, 16);
    }
}
