//! Disk-backed cache, one file per key
//!
//! Each key digest maps to one compressed file under a configurable root,
//! optionally sharded by nesting digest prefixes into subdirectories to
//! bound per-directory fan-out. File existence is the sole hit/miss signal:
//! writers stage the payload in a uniquely named temp file and publish it
//! with a hard link, so a reader never observes a partial entry. The link is
//! the only synchronization point between racing writers; whoever links
//! first wins and the others discard their identical result.

use super::{Cache, CacheStats};
use crate::core::{CacheError, CacheKey, Codec, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Disk cache layout and codec settings
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding the cache files
    pub root: PathBuf,
    /// Number of nested shard directories derived from the digest prefix
    pub shard_levels: usize,
    /// Characters of digest consumed per shard level
    pub shard_width: usize,
    /// File extension for cache entries
    pub suffix: String,
    /// Payload codec
    pub codec: Codec,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cache"),
            shard_levels: 0,
            shard_width: 2,
            suffix: "bin".to_string(),
            codec: Codec::default(),
        }
    }
}

/// One serialized, compressed file per key, published atomically
pub struct DiskCache<V> {
    config: DiskCacheConfig,
    stats: Arc<RwLock<CacheStats>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for DiskCache<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            _value: PhantomData,
        }
    }
}

impl<V: Serialize + DeserializeOwned> DiskCache<V> {
    /// Create or open a disk cache rooted at `config.root`
    pub fn new(config: DiskCacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        info!(
            "opening disk cache at {:?} (shard_levels={}, shard_width={})",
            config.root, config.shard_levels, config.shard_width
        );
        Ok(Self {
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            _value: PhantomData,
        })
    }

    /// Canonical file path for a key digest
    pub fn entry_path(&self, digest: &str) -> PathBuf {
        let mut path = self.config.root.clone();
        for level in 0..self.config.shard_levels {
            let start = level * self.config.shard_width;
            let end = (start + self.config.shard_width).min(digest.len());
            if start >= end {
                break;
            }
            path.push(&digest[start..end]);
        }
        path.push(format!("{digest}.{}", self.config.suffix));
        path
    }

    fn read_entry(&self, path: &Path) -> Result<Option<V>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = self
            .config
            .codec
            .decode(&bytes)
            .map_err(|e| CacheError::CorruptEntry(format!("{}: {e}", path.display())))?;
        Ok(Some(value))
    }

    fn write_entry(&self, path: &Path, value: &V) -> Result<()> {
        let payload = self.config.codec.encode(value)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = temp_sibling(path);
        fs::write(&tmp, &payload)?;
        publish(&tmp, path)
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Remove every cache file under the root
    pub fn clear(&self) -> Result<()> {
        fs::remove_dir_all(&self.config.root)?;
        fs::create_dir_all(&self.config.root)?;
        debug!("cleared disk cache at {:?}", self.config.root);
        Ok(())
    }
}

impl<V: Serialize + DeserializeOwned> Cache<V> for DiskCache<V> {
    fn fetch<F>(&self, key: &CacheKey, compute: F) -> Result<Option<V>>
    where
        F: FnOnce() -> anyhow::Result<Option<V>>,
    {
        let digest = key.digest();
        let path = self.entry_path(&digest);

        if let Some(value) = self.read_entry(&path)? {
            self.stats.write().record_hit();
            return Ok(Some(value));
        }
        self.stats.write().record_miss();

        match compute().map_err(CacheError::Compute)? {
            Some(value) => {
                // A persistence failure degrades the cache to recomputing,
                // never to losing the freshly computed value.
                if let Err(e) = self.write_entry(&path, &value) {
                    warn!("failed to persist entry {digest}: {e}");
                } else {
                    self.stats.write().record_insert();
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn try_get(&self, key: &CacheKey) -> Result<Option<V>> {
        let digest = key.digest();
        let path = self.entry_path(&digest);
        let value = self.read_entry(&path)?;
        let mut stats = self.stats.write();
        if value.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        Ok(value)
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.entry_path(&key.digest()).exists()
    }

    fn delete_key(&self, key: &CacheKey) -> Result<()> {
        let digest = key.digest();
        match fs::remove_file(self.entry_path(&digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::KeyNotFound(digest)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Temp-file path co-located with `target`: `_<basename>-<hostname>-<pid>`.
/// Same-directory placement keeps the later hard link on one filesystem.
pub(crate) fn temp_sibling(target: &Path) -> PathBuf {
    let basename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let host = sys_info::hostname().unwrap_or_else(|_| "localhost".to_string());
    let name = format!("_{basename}-{host}-{}", std::process::id());
    target.with_file_name(name)
}

/// Publish a staged temp file onto its canonical path via hard link.
///
/// "Already exists" means a concurrent writer published first; since all
/// racing writers hold equivalent results of the same deterministic
/// computation, the race is ignored. The temp file is removed either way.
pub(crate) fn publish(tmp: &Path, target: &Path) -> Result<()> {
    let linked = match fs::hard_link(tmp, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            trace!("lost publish race for {:?}", target);
            Ok(())
        }
        Err(e) => Err(CacheError::from(e)),
    };
    if let Err(e) = fs::remove_file(tmp) {
        debug!("failed to remove temp file {:?}: {e}", tmp);
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cache_in(dir: &Path, shard_levels: usize) -> DiskCache<String> {
        DiskCache::new(DiskCacheConfig {
            root: dir.to_path_buf(),
            shard_levels,
            ..DiskCacheConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn entry_paths_shard_by_digest_prefix() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), 2);
        let key = CacheKey::of(&["doc", "42"]).unwrap();
        let digest = key.digest();

        let path = cache.entry_path(&digest);
        let rel = path.strip_prefix(dir.path()).unwrap();
        let parts: Vec<_> = rel.components().collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(rel.to_string_lossy(), format!(
            "{}/{}/{digest}.bin",
            &digest[0..2],
            &digest[2..4]
        ));
    }

    #[test]
    fn temp_files_are_siblings_of_their_target() {
        let target = Path::new("/some/dir/abc.bin");
        let tmp = temp_sibling(target);
        assert_eq!(tmp.parent(), target.parent());
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("_abc.bin-"));
        assert!(name.ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn fetch_persists_and_replays() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), 0);
        let key = CacheKey::of(&[7u32]).unwrap();

        let value = cache.fetch(&key, || Ok(Some("7".to_string()))).unwrap();
        assert_eq!(value.as_deref(), Some("7"));
        assert!(cache.contains_key(&key));

        // Hit path must not consult the compute function.
        let value = cache
            .fetch(&key, || panic!("must not recompute"))
            .unwrap();
        assert_eq!(value.as_deref(), Some("7"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), 0);
        let key = CacheKey::of(&["x"]).unwrap();
        cache.fetch(&key, || Ok(Some("v".to_string()))).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('_'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_entries_fail_loudly() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path(), 0);
        let key = CacheKey::of(&["doc"]).unwrap();
        cache.fetch(&key, || Ok(Some("v".to_string()))).unwrap();

        fs::write(cache.entry_path(&key.digest()), b"\x09not a payload").unwrap();
        let err = cache.fetch(&key, || Ok(Some("v".to_string()))).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }
}
