//! In-process implementation of the hash contract
//!
//! Used by the test suite in place of a live server, and usable as a
//! process-local backend when no durable store is reachable.

use super::HashStore;
use crate::core::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Hash store held entirely in process memory
#[derive(Default)]
pub struct MemoryHashStore {
    hashes: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hashes currently stored
    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    /// True if no hashes are stored
    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}

impl HashStore for MemoryHashStore {
    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        Ok(self.hashes.read().get(key).cloned().unwrap_or_default())
    }

    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        self.hashes
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn hash_set_many(&self, key: &str, entries: &[(String, Vec<u8>)]) -> Result<()> {
        let mut hashes = self.hashes.write();
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in entries {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        let mut hashes = self.hashes.write();
        Ok(hashes
            .get_mut(key)
            .is_some_and(|hash| hash.remove(field).is_some()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.hashes.write().remove(key).is_some())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
