//! FIFO-evicting map with a fixed entry limit.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A cached value together with the order in which its key was first inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub insertion_order: u64,
}

/// Key/value map holding at most `capacity` entries.
///
/// Eviction is strictly by insertion order. Overwriting an existing key keeps
/// its original `insertion_order`, so it neither triggers an eviction nor
/// moves the key to the back of the queue.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    next_order: u64,
    entries: HashMap<K, CacheEntry<K, V>>,
    order: BTreeMap<u64, K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one; a cache that can hold nothing
    /// would silently turn every `set` into a no-op.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_order: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key. Absent keys return `None`; lookups do not affect eviction.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite a value.
    ///
    /// Returns the entry evicted to make room, if any. Overwrites never evict.
    pub fn set(&mut self, key: K, value: V) -> Option<CacheEntry<K, V>> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let insertion_order = self.next_order;
        self.next_order += 1;
        self.order.insert(insertion_order, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                insertion_order,
            },
        );

        evicted
    }

    /// Remove a single key.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.insertion_order);
        Some(entry.value)
    }

    /// Remove every entry whose key matches `predicate`. Returns how many were removed.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let doomed: Vec<u64> = self
            .order
            .iter()
            .filter(|(_, key)| predicate(key))
            .map(|(order, _)| *order)
            .collect();

        for order in &doomed {
            if let Some(key) = self.order.remove(order) {
                self.entries.remove(&key);
            }
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys from oldest to newest insertion.
    pub fn keys_in_order(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    fn evict_oldest(&mut self) -> Option<CacheEntry<K, V>> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key)
    }
}

impl<V> BoundedCache<String, V> {
    /// Remove every key starting with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        self.remove_where(|key| key.starts_with(prefix))
    }
}
