//! In-process cache with timestamp-based eviction
//!
//! A mapping from key to value paired with a mapping from key to last-access
//! stamp. Stamps come from a per-cache monotonic counter, so "least recently
//! used" is exact even when two accesses land in the same clock tick.

use super::{Cache, CacheStats};
use crate::core::{CacheError, CacheKey, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

struct MemoryInner<K, V> {
    values: HashMap<K, V>,
    last_access: HashMap<K, u64>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> MemoryInner<K, V> {
    fn touch(&mut self, key: &K) {
        self.tick += 1;
        self.last_access.insert(key.clone(), self.tick);
    }

    fn oldest(&self) -> Option<K> {
        // Global scan; ties broken arbitrarily.
        self.last_access
            .iter()
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(key, _)| key.clone())
    }
}

/// Process-local cache. `max_size == 0` means unbounded.
///
/// Handles are cheap to clone and share one underlying map. Generic over the
/// key type: standalone use goes through [`CacheKey`] via the [`Cache`]
/// trait, while [`HybridCache`](super::HybridCache) keys its hot layer by
/// digest strings.
pub struct MemoryCache<K, V> {
    inner: Arc<RwLock<MemoryInner<K, V>>>,
    stats: Arc<RwLock<CacheStats>>,
    max_size: usize,
}

impl<K, V> Clone for MemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stats: Arc::clone(&self.stats),
            max_size: self.max_size,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> MemoryCache<K, V> {
    /// Create a cache holding at most `max_size` entries (0 = unbounded)
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner {
                values: HashMap::new(),
                last_access: HashMap::new(),
                tick: 0,
            })),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            max_size,
        }
    }

    /// Look a key up, refreshing its access stamp on a hit
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        let mut stats = self.stats.write();

        if let Some(value) = inner.values.get(key).cloned() {
            inner.touch(key);
            stats.record_hit();
            Some(value)
        } else {
            stats.record_miss();
            None
        }
    }

    /// Insert a value, evicting least-recently-accessed entries while over
    /// capacity
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write();
        inner.values.insert(key.clone(), value);
        inner.touch(&key);
        self.stats.write().record_insert();

        if self.max_size == 0 {
            return;
        }
        while inner.values.len() > self.max_size {
            let Some(victim) = inner.oldest() else {
                break;
            };
            inner.values.remove(&victim);
            inner.last_access.remove(&victim);
            self.stats.write().record_eviction();
            trace!("evicted least-recently-used entry");
        }
    }

    /// Remove a key, returning its value if present
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        inner.last_access.remove(key);
        inner.values.remove(key)
    }

    /// True if the key is present (does not refresh its stamp)
    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().values.contains_key(key)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    /// True if no entries are cached
    pub fn is_empty(&self) -> bool {
        self.inner.read().values.is_empty()
    }

    /// Snapshot of all keys
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().values.keys().cloned().collect()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .read()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let count = inner.values.len();
        inner.values.clear();
        inner.last_access.clear();
        debug!("cleared {count} entries");
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

impl<V: Clone> Cache<V> for MemoryCache<CacheKey, V> {
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
