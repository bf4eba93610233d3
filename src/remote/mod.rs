//! Hash-oriented remote key-value store
//!
//! The remote backends consume a minimal hash contract: get/set one field,
//! set many, enumerate all, delete a hash, ping. The wire format beyond
//! that contract is the store's business. [`RedisStore`] is the production
//! implementation; [`MemoryHashStore`] is an in-process stand-in used by
//! tests and available as a fallback backend.

mod memory;
mod redis_store;

pub use memory::MemoryHashStore;
pub use redis_store::RedisStore;

use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Remote store connection settings.
///
/// Read from the environment via [`RemoteConfig::from_env`]:
/// `RECALL_REDIS_HOST` (default `127.0.0.1`) and `RECALL_REDIS_PORT`
/// (default `6379`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
        }
    }
}

impl RemoteConfig {
    /// Read host and port from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("RECALL_REDIS_HOST").unwrap_or(defaults.host);
        let port = std::env::var("RECALL_REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }

    /// Connection URL for the redis client
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// The hash contract consumed by remote-backed caches.
///
/// One remote hash holds one logical cache: one field per cache entry,
/// values being opaque byte strings. Consistency is per single key,
/// whatever the store guarantees; no cross-key transaction is assumed.
pub trait HashStore: Send + Sync {
    /// Read one field
    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// Read all fields of a hash (empty map if the hash is absent)
    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>>;

    /// Write one field
    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()>;

    /// Write many fields in one operation
    fn hash_set_many(&self, key: &str, entries: &[(String, Vec<u8>)]) -> Result<()>;

    /// Remove one field, reporting whether it existed
    fn hash_del(&self, key: &str, field: &str) -> Result<bool>;

    /// Remove a whole hash, reporting whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Health check
    fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_documented_values() {
        let config = RemoteConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.url(), "redis://127.0.0.1:6379/");
    }
}
