//! # recall
//!
//! Memoization and caching toolkit: the caching core of an NLP-pipeline
//! stack, where a single tagger or parser call can cost seconds and the
//! same inputs recur across runs.
//!
//! Backends share one fetch-or-compute contract ([`Cache`]):
//! - [`MemoryCache`] — process-local, timestamp-based eviction
//! - [`TtlMemoryCache`] — lazy access-time expiry
//! - [`DiskCache`] — one compressed file per key, published atomically
//! - [`RemoteCache`] — hash-oriented remote key-value service
//! - [`IterableCache`] — record-stream caching of lazy sequences
//! - [`HybridCache`] — memory hot path over a durable store, with explicit
//!   conflict-resolved synchronization and batch sync via [`CacheRegistry`]
//!
//! [`memoize`] fuses a function with a cache instance:
//!
//! ```
//! use recall::{memoize, CacheKey, MemoryCache};
//!
//! let tag = memoize(
//!     MemoryCache::<CacheKey, String>::new(0),
//!     |args: &(String,)| Ok(Some(format!("{}/NOUN", args.0))),
//! );
//! let tagged = tag.call(&("Katze".to_string(),)).unwrap();
//! assert_eq!(tagged.as_deref(), Some("Katze/NOUN"));
//! ```
//!
//! Cache unavailability degrades performance, never correctness: values
//! that fail to persist are still returned, while corrupt stored entries
//! fail loudly instead of masquerading as misses.

pub mod cache;
pub mod config;
pub mod core;
pub mod memoize;
pub mod remote;

pub use cache::{
    Cache, CacheRegistry, CacheStats, DiskCache, DiskCacheConfig, DiskSnapshotStore,
    HybridCache, HybridCacheConfig, IterableCache, IterableCacheConfig, MemoryCache,
    RecordStream, RemoteCache, RemoteCacheConfig, RemoteSnapshotStore, SnapshotStore,
    StoreKind, SyncPriority, SyncReport, SyncTarget, TtlMemoryCache, default_registry,
};
pub use config::RecallConfig;
pub use core::{CacheError, CacheKey, Codec, Compression, Result, ToCacheKey};
pub use memoize::{Memoized, memoize};
pub use remote::{HashStore, MemoryHashStore, RedisStore, RemoteConfig};
