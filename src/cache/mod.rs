//! Process-wide render caches.
//!
//! [`SharedCache`] wraps a [`CacheStore`] with single-flight semantics:
//! concurrent requests for the same key share one computation, and a value
//! never changes once stored. Used for rendered blocks and bibliographies.

mod store;

pub use store::{CacheStore, LruStore};

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

type Slot<V> = Arc<OnceCell<V>>;

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Thread-safe cache with atomic insert-if-absent.
pub struct SharedCache<K, V> {
    store: Mutex<Box<dyn CacheStore<K, Slot<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// LRU-evicting cache holding at most `capacity` entries.
    pub fn lru(capacity: NonZeroUsize) -> Self {
        Self::with_store(Box::new(LruStore::new(capacity)))
    }

    pub fn with_store(store: Box<dyn CacheStore<K, Slot<V>>>) -> Self {
        Self {
            store: Mutex::new(store),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Stored value for `key`, if its computation has completed.
    #[cfg(test)]
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.store.lock().get(key)?;
        slot.get().cloned()
    }

    /// Return the cached value, or run `init` exactly once across all
    /// concurrent callers for this key.
    ///
    /// A failed `init` stores nothing; a later call retries.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut store = self.store.lock();
            match store.get(&key) {
                Some(slot) => slot,
                None => {
                    let slot: Slot<V> = Arc::new(OnceCell::new());
                    store.put(key, Arc::clone(&slot));
                    slot
                }
            }
        };

        let computed = AtomicBool::new(false);
        let value = slot
            .get_or_try_init(|| {
                computed.store(true, Ordering::Relaxed);
                init()
            })
            .await?;

        if computed.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value.clone())
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: store.len(),
            capacity: store.capacity(),
        }
    }
}
