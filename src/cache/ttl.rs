//! Memory cache with lazy time-to-live expiry
//!
//! Stores an insertion stamp next to every entry. Expiry is evaluated only
//! when an entry is accessed; there is no background sweep. An entry past
//! its TTL is purged on access and the lookup proceeds as a miss. This is a
//! latency/simplicity trade-off: an expired entry that is never touched
//! again occupies memory until evicted by capacity pressure.

use super::memory::MemoryCache;
use super::Cache;
use crate::core::{CacheError, CacheKey, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// [`MemoryCache`] variant whose entries expire `ttl` after insertion
pub struct TtlMemoryCache<K, V> {
    memory: MemoryCache<K, V>,
    inserted: Arc<RwLock<HashMap<K, Instant>>>,
    ttl: Duration,
}

impl<K, V> Clone for TtlMemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            inserted: Arc::clone(&self.inserted),
            ttl: self.ttl,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlMemoryCache<K, V> {
    /// Create a cache whose entries live for `ttl` after insertion
    /// (`max_size == 0` means unbounded)
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_size),
            inserted: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Purge the entry if its TTL has elapsed. Returns true if it was purged.
    fn expire_if_due(&self, key: &K) -> bool {
        let due = self
            .inserted
            .read()
            .get(key)
            .is_some_and(|at| at.elapsed() > self.ttl);
        if due {
            debug!("entry expired after {:?}", self.ttl);
            self.inserted.write().remove(key);
            self.memory.remove(key);
        }
        due
    }

    /// Look a key up, purging it first if expired
    pub fn get(&self, key: &K) -> Option<V> {
        if self.expire_if_due(key) {
            return None;
        }
        let value = self.memory.get(key);
        if value.is_none() {
            // Capacity eviction in the value map leaves the insertion stamp
            // behind; drop it so the map does not grow without bound.
            self.inserted.write().remove(key);
        }
        value
    }

    /// Insert a value, stamping its insertion time
    pub fn insert(&self, key: K, value: V) {
        self.inserted.write().insert(key.clone(), Instant::now());
        self.memory.insert(key, value);
    }

    /// Remove a key and its stamps, returning its value if present
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inserted.write().remove(key);
        self.memory.remove(key)
    }

    /// True if the key is present and not expired
    pub fn contains(&self, key: &K) -> bool {
        if self.expire_if_due(key) {
            return false;
        }
        self.memory.contains(key)
    }

    /// Number of entries, including any not-yet-purged expired ones
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// True if no entries are cached
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Hit/miss counters of the underlying memory cache
    pub fn stats(&self) -> super::CacheStats {
        self.memory.stats()
    }
}

impl<V: Clone> Cache<V> for TtlMemoryCache<CacheKey, V> {
    fn fetch<F>(&self, key: &CacheKey, compute: F) -> Result<Option<V>>
    where
        F: FnOnce() -> anyhow::Result<Option<V>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }
        match compute().map_err(CacheError::Compute)? {
            Some(value) => {
                self.insert(key.clone(), value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<V>> {
        Ok(self.get(key))
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.contains(key)
    }

    fn delete_key(&self, key: &CacheKey) -> Result<()> {
        self.remove(key)
            .map(|_| ())
            .ok_or_else(|| CacheError::KeyNotFound(key.digest()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn entries_survive_until_their_ttl() {
        let cache: TtlMemoryCache<&str, u32> =
            TtlMemoryCache::new(0, Duration::from_millis(400));
        cache.insert("k", 1);

        sleep(Duration::from_millis(50));
        assert_eq!(cache.get(&"k"), Some(1));
        assert!(cache.contains(&"k"));
    }

    #[test]
    fn expired_entries_fall_through_to_miss() {
        let cache: TtlMemoryCache<&str, u32> =
            TtlMemoryCache::new(0, Duration::from_millis(50));
        cache.insert("k", 1);

        sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&"k"), None);
        assert!(!cache.contains(&"k"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn refetch_after_expiry_recomputes() {
        let cache: TtlMemoryCache<CacheKey, u32> =
            TtlMemoryCache::new(0, Duration::from_millis(50));
        let key = CacheKey::of(&["n"]).unwrap();

        let first = cache.fetch(&key, || Ok(Some(1))).unwrap();
        assert_eq!(first, Some(1));

        // Before expiry a changed compute function is not consulted.
        let cached = cache.fetch(&key, || Ok(Some(2))).unwrap();
        assert_eq!(cached, Some(1));

        sleep(Duration::from_millis(120));
        let fresh = cache.fetch(&key, || Ok(Some(2))).unwrap();
        assert_eq!(fresh, Some(2));
    }
}
