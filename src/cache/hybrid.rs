//! Hybrid cache: memory hot path over a durable store
//!
//! Construction hydrates the in-memory layer from the durable snapshot
//! (best-effort; a missing or corrupt snapshot means starting empty) and
//! registers the cache in a [`CacheRegistry`] group for batch sync. Fetches
//! touch only memory; every computed miss marks its key dirty. Durable
//! state catches up when the caller triggers [`HybridCache::sync_upstream`],
//! which re-reads the snapshot, merges under an explicit conflict policy,
//! and persists either the whole mapping or just the dirty keys.
//!
//! `sync_upstream` is read-merge-write without compare-and-swap: concurrent
//! syncs against the same durable store can silently lose updates. Callers
//! that sync from several processes need their own locking.

use super::disk::temp_sibling;
use super::group::{CacheRegistry, SyncTarget};
use super::memory::MemoryCache;
use super::{Cache, CacheStats};
use crate::core::{CacheError, CacheKey, Codec, Result};
use crate::remote::HashStore;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which side wins a merge conflict during sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPriority {
    /// Locally held values win
    Local,
    /// Durable values win and replace the in-memory copy
    Server,
}

/// The kind of durable store behind a hybrid cache; also the grouping key
/// for batch sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Disk,
    Remote,
}

/// Durable side of a hybrid cache: a persistent digest-to-payload mapping
pub trait SnapshotStore: Send + Sync + 'static {
    fn kind(&self) -> StoreKind;

    /// Human-readable location for log lines
    fn location(&self) -> String;

    /// Read the full current mapping. A missing snapshot is an empty map;
    /// an unreadable one is an error (callers degrade to empty with a
    /// warning).
    fn read_snapshot(&self) -> Result<HashMap<String, Vec<u8>>>;

    /// Overwrite the entire durable mapping in one operation
    fn write_snapshot(&self, merged: &HashMap<String, Vec<u8>>) -> Result<()>;

    /// Persist only the dirty subset of an already merged mapping
    fn write_dirty(
        &self,
        merged: &HashMap<String, Vec<u8>>,
        dirty: &HashSet<String>,
    ) -> Result<()>;

    /// Persist a single entry (write-through path)
    fn write_entry(&self, digest: &str, payload: &[u8]) -> Result<()>;
}

/// Snapshot store as one compressed mapping file
pub struct DiskSnapshotStore {
    path: PathBuf,
    codec: Codec,
}

impl DiskSnapshotStore {
    /// Store the mapping at `<dir>/<name>.snap`
    pub fn new(dir: impl AsRef<Path>, name: &str, codec: Codec) -> Self {
        Self {
            path: dir.as_ref().join(format!("{name}.snap")),
            codec,
        }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for DiskSnapshotStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Disk
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_snapshot(&self) -> Result<HashMap<String, Vec<u8>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        self.codec
            .decode(&bytes)
            .map_err(|e| CacheError::CorruptEntry(format!("{}: {e}", self.path.display())))
    }

    fn write_snapshot(&self, merged: &HashMap<String, Vec<u8>>) -> Result<()> {
        let payload = self.codec.encode(merged)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = temp_sibling(&self.path);
        fs::write(&tmp, &payload)?;
        // Unlike per-key entries, the snapshot replaces its predecessor, so
        // it is published with an atomic rename; a reader sees either the
        // old complete file or the new one.
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn write_dirty(
        &self,
        merged: &HashMap<String, Vec<u8>>,
        _dirty: &HashSet<String>,
    ) -> Result<()> {
        // A single-file mapping cannot be updated per key; the merged
        // mapping is republished whole.
        self.write_snapshot(merged)
    }

    fn write_entry(&self, digest: &str, payload: &[u8]) -> Result<()> {
        let mut current = self.read_snapshot().unwrap_or_else(|e| {
            warn!("replacing unreadable snapshot {}: {e}", self.path.display());
            HashMap::new()
        });
        current.insert(digest.to_string(), payload.to_vec());
        self.write_snapshot(&current)
    }
}

/// Snapshot store as one remote hash, one field per entry
pub struct RemoteSnapshotStore {
    store: Arc<dyn HashStore>,
    namespace: String,
}

impl RemoteSnapshotStore {
    pub fn new(store: Arc<dyn HashStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }
}

impl SnapshotStore for RemoteSnapshotStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    fn location(&self) -> String {
        self.namespace.clone()
    }

    fn read_snapshot(&self) -> Result<HashMap<String, Vec<u8>>> {
        self.store.hash_get_all(&self.namespace)
    }

    fn write_snapshot(&self, merged: &HashMap<String, Vec<u8>>) -> Result<()> {
        self.store.delete(&self.namespace)?;
        let entries: Vec<(String, Vec<u8>)> = merged
            .iter()
            .map(|(digest, payload)| (digest.clone(), payload.clone()))
            .collect();
        self.store.hash_set_many(&self.namespace, &entries)
    }

    fn write_dirty(
        &self,
        merged: &HashMap<String, Vec<u8>>,
        dirty: &HashSet<String>,
    ) -> Result<()> {
        for digest in dirty {
            if let Some(payload) = merged.get(digest) {
                self.store.hash_set(&self.namespace, digest, payload)?;
            }
        }
        Ok(())
    }

    fn write_entry(&self, digest: &str, payload: &[u8]) -> Result<()> {
        self.store.hash_set(&self.namespace, digest, payload)
    }
}

/// Hybrid cache settings
#[derive(Debug, Clone)]
pub struct HybridCacheConfig {
    /// Name used in the registry and in log lines
    pub name: String,
    /// Capacity of the in-memory hot layer (0 = unbounded)
    pub max_memory_entries: usize,
    /// "Realtime" variant: persist each computed miss immediately instead
    /// of waiting for an explicit sync
    pub write_through: bool,
    /// Payload codec for the durable side
    pub codec: Codec,
}

impl HybridCacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_memory_entries: 0,
            write_through: false,
            codec: Codec::default(),
        }
    }

    /// Enable per-miss durable write-through
    pub fn realtime(mut self) -> Self {
        self.write_through = true;
        self
    }
}

/// Memory hot path over a durable cold path with explicit synchronization
pub struct HybridCache<V, S> {
    name: String,
    memory: MemoryCache<String, V>,
    store: Arc<S>,
    dirty: Arc<RwLock<HashSet<String>>>,
    codec: Codec,
    write_through: bool,
}

impl<V, S> Clone for HybridCache<V, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            memory: self.memory.clone(),
            store: Arc::clone(&self.store),
            dirty: Arc::clone(&self.dirty),
            codec: self.codec.clone(),
            write_through: self.write_through,
        }
    }
}

impl<V, S> HybridCache<V, S>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: SnapshotStore,
{
    /// Create the cache, hydrate it from the durable snapshot, and register
    /// it in `registry` under the store's kind
    pub fn new(config: HybridCacheConfig, store: S, registry: &CacheRegistry) -> Self {
        let store = Arc::new(store);
        let memory = MemoryCache::new(config.max_memory_entries);

        let snapshot = store.read_snapshot().unwrap_or_else(|e| {
            warn!(
                "cache '{}': hydration from {} failed ({e}); starting empty",
                config.name,
                store.location()
            );
            HashMap::new()
        });
        let mut loaded = 0usize;
        for (digest, payload) in snapshot {
            match config.codec.decode::<V>(&payload) {
                Ok(value) => {
                    memory.insert(digest, value);
                    loaded += 1;
                }
                Err(e) => warn!(
                    "cache '{}': skipping undecodable entry {digest}: {e}",
                    config.name
                ),
            }
        }
        info!(
            "cache '{}': hydrated {loaded} entries from {}",
            config.name,
            store.location()
        );

        let cache = Self {
            name: config.name,
            memory,
            store,
            dirty: Arc::new(RwLock::new(HashSet::new())),
            codec: config.codec,
            write_through: config.write_through,
        };
        registry.register(Box::new(cache.clone()));
        cache
    }

    /// Synchronize the in-memory and durable views.
    ///
    /// Re-reads the durable snapshot, merges it with memory under
    /// `priority`, then persists the merged mapping — whole (`bulk`) or
    /// dirty-keys-only. The dirty set is cleared only after a successful
    /// incremental write; bulk writes make dirty tracking moot.
    pub fn sync_upstream(&self, priority: SyncPriority, bulk: bool) -> Result<()> {
        let durable = self.store.read_snapshot().unwrap_or_else(|e| {
            warn!(
                "cache '{}': snapshot re-read failed ({e}); merging against empty",
                self.name
            );
            HashMap::new()
        });

        let mut merged: HashMap<String, Vec<u8>> = HashMap::new();
        for (digest, value) in self.memory.entries() {
            match self.codec.encode(&value) {
                Ok(payload) => {
                    merged.insert(digest, payload);
                }
                Err(e) => warn!("cache '{}': failed to encode {digest}: {e}", self.name),
            }
        }

        for (digest, payload) in durable {
            let durable_wins =
                priority == SyncPriority::Server || !merged.contains_key(&digest);
            if !durable_wins {
                continue;
            }
            match self.codec.decode::<V>(&payload) {
                Ok(value) => {
                    self.memory.insert(digest.clone(), value);
                    merged.insert(digest, payload);
                }
                Err(e) => warn!(
                    "cache '{}': dropping undecodable durable entry {digest}: {e}",
                    self.name
                ),
            }
        }

        if bulk {
            self.store.write_snapshot(&merged)?;
            debug!(
                "cache '{}': bulk-synced {} entries to {}",
                self.name,
                merged.len(),
                self.store.location()
            );
        } else {
            let dirty = self.dirty.read().clone();
            self.store.write_dirty(&merged, &dirty)?;
            debug!(
                "cache '{}': synced {} dirty entries to {}",
                self.name,
                dirty.len(),
                self.store.location()
            );
            self.dirty.write().clear();
        }
        Ok(())
    }

    /// Digests mutated since the last successful incremental sync
    pub fn dirty_len(&self) -> usize {
        self.dirty.read().len()
    }

    /// Entries currently held in memory
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// True if the hot layer is empty
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Hit/miss counters of the hot layer
    pub fn stats(&self) -> CacheStats {
        self.memory.stats()
    }

    fn store_entry(&self, digest: &str, value: &V) {
        match self.codec.encode(value) {
            Ok(payload) => match self.store.write_entry(digest, &payload) {
                Ok(()) => {
                    self.dirty.write().remove(digest);
                }
                Err(e) => warn!(
                    "cache '{}': write-through failed for {digest}: {e}",
                    self.name
                ),
            },
            Err(e) => warn!(
                "cache '{}': write-through encode failed for {digest}: {e}",
                self.name
            ),
        }
    }
}

impl<V, S> Cache<V> for HybridCache<V, S>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: SnapshotStore,
{
    fn fetch<F>(&self, key: &CacheKey, compute: F) -> Result<Option<V>>
    where
        F: FnOnce() -> anyhow::Result<Option<V>>,
    {
        let digest = key.digest();
        if let Some(value) = self.memory.get(&digest) {
            return Ok(Some(value));
        }
        match compute().map_err(CacheError::Compute)? {
            Some(value) => {
                self.memory.insert(digest.clone(), value.clone());
                self.dirty.write().insert(digest.clone());
                if self.write_through {
                    self.store_entry(&digest, &value);
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<V>> {
        Ok(self.memory.get(&key.digest()))
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.memory.contains(&key.digest())
    }

    fn delete_key(&self, key: &CacheKey) -> Result<()> {
        let digest = key.digest();
        self.dirty.write().remove(&digest);
        self.memory
            .remove(&digest)
            .map(|_| ())
            .ok_or(CacheError::KeyNotFound(digest))
    }
}

impl<V, S> SyncTarget for HybridCache<V, S>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: SnapshotStore,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> StoreKind {
        self.store.kind()
    }

    fn sync_upstream(&self, priority: SyncPriority, bulk: bool) -> Result<()> {
        HybridCache::sync_upstream(self, priority, bulk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::group::CacheRegistry;
    use tempfile::tempdir;

    fn disk_cache(
        dir: &Path,
        registry: &CacheRegistry,
        write_through: bool,
    ) -> HybridCache<String, DiskSnapshotStore> {
        let mut config = HybridCacheConfig::new("lemmas");
        config.write_through = write_through;
        HybridCache::new(
            config,
            DiskSnapshotStore::new(dir, "lemmas", Codec::default()),
            registry,
        )
    }

    #[test]
    fn computed_misses_mark_keys_dirty() {
        let dir = tempdir().unwrap();
        let registry = CacheRegistry::new();
        let cache = disk_cache(dir.path(), &registry, false);
        let key = CacheKey::of(&["Katzen"]).unwrap();

        cache.fetch(&key, || Ok(Some("Katze".to_string()))).unwrap();
        assert_eq!(cache.dirty_len(), 1);

        // A hit does not re-dirty the key.
        cache.fetch(&key, || Ok(Some("x".to_string()))).unwrap();
        assert_eq!(cache.dirty_len(), 1);

        cache.sync_upstream(SyncPriority::Local, false).unwrap();
        assert_eq!(cache.dirty_len(), 0);
    }

    #[test]
    fn write_through_persists_each_miss() {
        let dir = tempdir().unwrap();
        let registry = CacheRegistry::new();
        let cache = disk_cache(dir.path(), &registry, true);
        let key = CacheKey::of(&["Häuser"]).unwrap();

        cache.fetch(&key, || Ok(Some("Haus".to_string()))).unwrap();
        assert_eq!(cache.dirty_len(), 0);

        let store = DiskSnapshotStore::new(dir.path(), "lemmas", Codec::default());
        let snapshot = store.read_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&key.digest()));
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempdir().unwrap();
        let key = CacheKey::of(&["Bäume"]).unwrap();
        {
            let registry = CacheRegistry::new();
            let cache = disk_cache(dir.path(), &registry, false);
            cache.fetch(&key, || Ok(Some("Baum".to_string()))).unwrap();
            cache.sync_upstream(SyncPriority::Local, true).unwrap();
        }

        let registry = CacheRegistry::new();
        let revived = disk_cache(dir.path(), &registry, false);
        assert_eq!(revived.len(), 1);
        let value = revived
            .fetch(&key, || panic!("must not recompute"))
            .unwrap();
        assert_eq!(value.as_deref(), Some("Baum"));
    }

    #[test]
    fn corrupt_snapshot_hydrates_empty() {
        let dir = tempdir().unwrap();
        let store = DiskSnapshotStore::new(dir.path(), "lemmas", Codec::default());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.path(), b"\x09junk").unwrap();

        let registry = CacheRegistry::new();
        let cache = disk_cache(dir.path(), &registry, false);
        assert!(cache.is_empty());
    }
}
