//! Cache backends
//!
//! All backends share one fetch-or-compute contract:
//! - in-memory with LRU-style eviction ([`MemoryCache`])
//! - in-memory with lazy TTL expiry ([`TtlMemoryCache`])
//! - one compressed file per key ([`DiskCache`])
//! - remote hash-oriented key-value service ([`RemoteCache`])
//! - record-stream caching of lazy sequences ([`IterableCache`])
//! - memory over a durable store with explicit sync ([`HybridCache`])

pub mod disk;
pub mod group;
pub mod hybrid;
pub mod iterable;
pub mod memory;
pub mod remote;
pub mod ttl;

pub use disk::{DiskCache, DiskCacheConfig};
pub use group::{CacheRegistry, SyncReport, SyncTarget, default_registry};
pub use hybrid::{
    DiskSnapshotStore, HybridCache, HybridCacheConfig, RemoteSnapshotStore, SnapshotStore,
    StoreKind, SyncPriority,
};
pub use iterable::{IterableCache, IterableCacheConfig, RecordStream};
pub use memory::MemoryCache;
pub use remote::{RemoteCache, RemoteCacheConfig};
pub use ttl::TtlMemoryCache;

use crate::core::{CacheKey, Result};
use serde::{Deserialize, Serialize};

/// Fetch-or-compute contract shared by every backend.
///
/// The compute function returns `Ok(None)` to signal an empty result; empty
/// results are returned to the caller but never cached, so a failed lookup
/// is retried on the next fetch.
pub trait Cache<V> {
    /// Look the key up; on a miss invoke `compute`, store a `Some` result,
    /// and return it. Compute failures propagate unchanged and cache nothing.
    fn fetch<F>(&self, key: &CacheKey, compute: F) -> Result<Option<V>>
    where
        F: FnOnce() -> anyhow::Result<Option<V>>;

    /// Look the key up without computing on a miss.
    fn try_get(&self, key: &CacheKey) -> Result<Option<V>>;

    /// True if the key currently has a cached value.
    fn contains_key(&self, key: &CacheKey) -> bool;

    /// Remove a cached value. Deleting an absent key is a contract
    /// violation and returns [`CacheError::KeyNotFound`].
    ///
    /// [`CacheError::KeyNotFound`]: crate::core::CacheError::KeyNotFound
    fn delete_key(&self, key: &CacheKey) -> Result<()>;
}

/// Hit/miss counters maintained by every backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub inserts: u64,
}

impl CacheStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_insert(&mut self) {
        self.inserts += 1;
    }

    /// Fraction of lookups answered from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
