//! Eviction policies behind [`CacheStore`].

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Bounded key-value storage with a pluggable eviction policy.
///
/// Implementations only decide *what* to evict; concurrency and
/// insert-if-absent live in [`super::SharedCache`].
pub trait CacheStore<K, V>: Send {
    /// Look up a value, counting as a use for the eviction policy.
    fn get(&mut self, key: &K) -> Option<V>;

    /// Insert a value, evicting as needed.
    fn put(&mut self, key: K, value: V);

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;
}

/// Least-recently-used eviction.
pub struct LruStore<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> LruStore<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }
}

impl<K, V> CacheStore<K, V> for LruStore<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get(&mut self, key: &K) -> Option<V> {
        self.inner.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(cap: usize) -> LruStore<&'static str, u32> {
        LruStore::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let mut s = store(2);
        s.put("a", 1);
        s.put("b", 2);
        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(s.get(&"a"), Some(1));
        s.put("c", 3);

        assert_eq!(s.len(), 2);
        assert_eq!(s.get(&"b"), None);
        assert_eq!(s.get(&"a"), Some(1));
        assert_eq!(s.get(&"c"), Some(3));
    }

    #[test]
    fn test_capacity_reported() {
        let s = store(8192);
        assert_eq!(s.capacity(), 8192);
        assert_eq!(s.len(), 0);
    }
}
