//! Cache backed by a remote hash store
//!
//! Same fetch/evict contract as the memory cache, with values and
//! usage-timestamps living in two keyspaces of the remote store: one hash
//! per logical cache for values, a sibling hash for last-access stamps.
//! Every value passes through the codec since the store holds opaque
//! bytes. Eviction enumerates all remote stamps and removes the globally
//! oldest — O(n) per eviction, since no secondary index is assumed.

use super::{Cache, CacheStats};
use crate::core::{CacheError, CacheKey, Codec, Result};
use crate::remote::HashStore;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Remote cache settings
#[derive(Debug, Clone)]
pub struct RemoteCacheConfig {
    /// Logical cache key; names the remote value and stamp hashes
    pub namespace: String,
    /// Maximum number of entries (0 = unbounded)
    pub max_size: usize,
    /// Payload codec
    pub codec: Codec,
}

impl RemoteCacheConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            max_size: 0,
            codec: Codec::default(),
        }
    }
}

/// Cache whose entries live in a remote hash-oriented key-value service
pub struct RemoteCache<V> {
    store: Arc<dyn HashStore>,
    config: RemoteCacheConfig,
    stats: Arc<RwLock<CacheStats>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for RemoteCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            _value: PhantomData,
        }
    }
}

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

impl<V: Serialize + DeserializeOwned> RemoteCache<V> {
    /// Create a cache over an already connected store
    pub fn new(store: Arc<dyn HashStore>, config: RemoteCacheConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            _value: PhantomData,
        }
    }

    fn values_key(&self) -> &str {
        &self.config.namespace
    }

    fn stamps_key(&self) -> String {
        format!("{}:last-access", self.config.namespace)
    }

    /// Refresh the usage stamp of a field. Stamp-write failures only cost
    /// eviction accuracy, so they are logged and swallowed.
    fn touch(&self, digest: &str) {
        let stamp = unix_micros().to_string();
        if let Err(e) = self
            .store
            .hash_set(&self.stamps_key(), digest, stamp.as_bytes())
        {
            warn!("failed to refresh usage stamp for {digest}: {e}");
        }
    }

    /// Remove the globally oldest entries until within capacity
    fn evict_over_capacity(&self) -> Result<()> {
        if self.config.max_size == 0 {
            return Ok(());
        }
        let stamps_key = self.stamps_key();
        let mut stamps: HashMap<String, u64> = self
            .store
            .hash_get_all(&stamps_key)?
            .into_iter()
            .map(|(field, raw)| {
                let stamp = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                (field, stamp)
            })
            .collect();

        while stamps.len() > self.config.max_size {
            let Some(victim) = stamps
                .iter()
                .min_by_key(|(_, stamp)| **stamp)
                .map(|(field, _)| field.clone())
            else {
                break;
            };
            self.store.hash_del(self.values_key(), &victim)?;
            self.store.hash_del(&stamps_key, &victim)?;
            stamps.remove(&victim);
            self.stats.write().record_eviction();
            debug!("evicted oldest remote entry {victim}");
        }
        Ok(())
    }

    fn read_entry(&self, digest: &str) -> Result<Option<V>> {
        match self.store.hash_get(self.values_key(), digest)? {
            Some(bytes) => {
                let value = self.config.codec.decode(&bytes).map_err(|e| {
                    CacheError::CorruptEntry(format!(
                        "{}/{digest}: {e}",
                        self.config.namespace
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Drop the cache's remote hashes entirely
    pub fn clear(&self) -> Result<()> {
        self.store.delete(self.values_key())?;
        self.store.delete(&self.stamps_key())?;
        Ok(())
    }
}

impl<V: Serialize + DeserializeOwned> Cache<V> for RemoteCache<V> {
    fn fetch<F>(&self, key: &CacheKey, compute: F) -> Result<Option<V>>
    where
        F: FnOnce() -> anyhow::Result<Option<V>>,
    {
        let digest = key.digest();

        if let Some(value) = self.read_entry(&digest)? {
            self.touch(&digest);
            self.stats.write().record_hit();
            return Ok(Some(value));
        }
        self.stats.write().record_miss();

        match compute().map_err(CacheError::Compute)? {
            Some(value) => {
                // Persistence failures degrade the cache, never the caller.
                match self.config.codec.encode(&value) {
                    Ok(payload) => {
                        if let Err(e) =
                            self.store.hash_set(self.values_key(), &digest, &payload)
                        {
                            warn!("failed to persist entry {digest}: {e}");
                        } else {
                            self.touch(&digest);
                            self.stats.write().record_insert();
                            if let Err(e) = self.evict_over_capacity() {
                                warn!("eviction failed: {e}");
                            }
                        }
                    }
                    Err(e) => warn!("failed to encode entry {digest}: {e}"),
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<V>> {
        let digest = key.digest();
        let value = self.read_entry(&digest)?;
        let mut stats = self.stats.write();
        if value.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        drop(stats);
        if value.is_some() {
            self.touch(&digest);
        }
        Ok(value)
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.store
            .hash_get(self.values_key(), &key.digest())
            .map(|v| v.is_some())
            .unwrap_or(false)
    }

    fn delete_key(&self, key: &CacheKey) -> Result<()> {
        let digest = key.digest();
        if !self.store.hash_del(self.values_key(), &digest)? {
            return Err(CacheError::KeyNotFound(digest));
        }
        self.store.hash_del(&self.stamps_key(), &digest)?;
        Ok(())
    }
}
