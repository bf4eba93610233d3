//! Cache registry and batch synchronization
//!
//! Hybrid caches register themselves here at construction, one group per
//! backing-store kind. `sync_all` flushes a group (or every group),
//! catching and logging each member's failure independently so one failing
//! cache never blocks the rest. A process-wide default registry exists for
//! ordinary use; tests construct their own to stay isolated.

use super::hybrid::{StoreKind, SyncPriority};
use crate::core::Result;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A cache that can be flushed to its durable store as part of a group
pub trait SyncTarget: Send + Sync {
    fn name(&self) -> String;
    fn kind(&self) -> StoreKind;
    fn sync_upstream(&self, priority: SyncPriority, bulk: bool) -> Result<()>;
}

/// Outcome of a batch sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// Registry of hybrid caches, grouped by backing-store kind
#[derive(Default)]
pub struct CacheRegistry {
    groups: RwLock<HashMap<StoreKind, Vec<Box<dyn SyncTarget>>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cache to the group of its store kind. Called by hybrid cache
    /// constructors.
    pub fn register(&self, target: Box<dyn SyncTarget>) {
        let kind = target.kind();
        debug!("registering cache '{}' in {kind:?} group", target.name());
        self.groups.write().entry(kind).or_default().push(target);
    }

    /// Number of caches registered under a kind
    pub fn group_len(&self, kind: StoreKind) -> usize {
        self.groups.read().get(&kind).map_or(0, |g| g.len())
    }

    /// Sync every cache of `kind`, or of all kinds when `kind` is `None`.
    /// Failures are logged per member and tallied, never propagated.
    pub fn sync_all(
        &self,
        kind: Option<StoreKind>,
        priority: SyncPriority,
        bulk: bool,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let groups = self.groups.read();
        for (group_kind, members) in groups.iter() {
            if kind.is_some_and(|k| k != *group_kind) {
                continue;
            }
            for member in members {
                match member.sync_upstream(priority, bulk) {
                    Ok(()) => report.synced += 1,
                    Err(e) => {
                        warn!("sync failed for cache '{}': {e}", member.name());
                        report.failed += 1;
                    }
                }
            }
        }
        debug!(
            "batch sync complete: {} synced, {} failed",
            report.synced, report.failed
        );
        report
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: CacheRegistry = CacheRegistry::new();
}

/// The process-wide default registry used when no explicit handle is passed
pub fn default_registry() -> &'static CacheRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CacheError;

    struct FakeTarget {
        name: &'static str,
        kind: StoreKind,
        fail: bool,
    }

    impl SyncTarget for FakeTarget {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn kind(&self) -> StoreKind {
            self.kind
        }

        fn sync_upstream(&self, _priority: SyncPriority, _bulk: bool) -> Result<()> {
            if self.fail {
                Err(CacheError::StoreUnavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn one_failure_does_not_block_the_rest() {
        let registry = CacheRegistry::new();
        registry.register(Box::new(FakeTarget {
            name: "good-disk",
            kind: StoreKind::Disk,
            fail: false,
        }));
        registry.register(Box::new(FakeTarget {
            name: "bad-remote",
            kind: StoreKind::Remote,
            fail: true,
        }));
        registry.register(Box::new(FakeTarget {
            name: "good-remote",
            kind: StoreKind::Remote,
            fail: false,
        }));

        let report = registry.sync_all(None, SyncPriority::Local, false);
        assert_eq!(report, SyncReport { synced: 2, failed: 1 });
    }

    #[test]
    fn sync_can_be_scoped_to_one_kind() {
        let registry = CacheRegistry::new();
        registry.register(Box::new(FakeTarget {
            name: "disk",
            kind: StoreKind::Disk,
            fail: false,
        }));
        registry.register(Box::new(FakeTarget {
            name: "remote",
            kind: StoreKind::Remote,
            fail: false,
        }));
        assert_eq!(registry.group_len(StoreKind::Disk), 1);

        let report = registry.sync_all(Some(StoreKind::Disk), SyncPriority::Server, true);
        assert_eq!(report, SyncReport { synced: 1, failed: 0 });
    }

    #[test]
    fn default_registry_is_shared() {
        let a = default_registry();
        let b = default_registry();
        assert!(std::ptr::eq(a, b));
    }
}
