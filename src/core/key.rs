//! Cache key derivation
//!
//! A `CacheKey` is an explicit, ordered list of serializable components
//! assembled by the caller. Equality and hashing are defined over the
//! canonical byte form of the components, and `digest()` produces a stable
//! hex SHA-256 usable as a filename or remote hash field across processes.

use super::error::{CacheError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Ordered, content-addressed cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheKey {
    parts: Vec<Vec<u8>>,
}

impl CacheKey {
    /// Create an empty key
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key from a homogeneous slice of components
    pub fn of<T: Serialize>(parts: &[T]) -> Result<Self> {
        let mut key = Self::new();
        for part in parts {
            key.push(part)?;
        }
        Ok(key)
    }

    /// Append a component
    pub fn push<T: Serialize>(&mut self, part: &T) -> Result<()> {
        let bytes = serde_json::to_vec(part)
            .map_err(|e| CacheError::Serialization(format!("key component: {e}")))?;
        self.parts.push(bytes);
        Ok(())
    }

    /// Append a component, builder-style
    pub fn with<T: Serialize>(mut self, part: &T) -> Result<Self> {
        self.push(part)?;
        Ok(self)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if the key has no components
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Stable hex SHA-256 of the key, comparable across processes.
    ///
    /// Components are length-prefixed before hashing so that `["ab", "c"]`
    /// and `["a", "bc"]` digest differently.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in &self.parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }
}

/// Conversion into a `CacheKey`, implemented for `CacheKey` itself and for
/// tuples of serializable components. This is how memoized functions derive
/// a key from their arguments.
pub trait ToCacheKey {
    fn to_cache_key(&self) -> Result<CacheKey>;
}

impl ToCacheKey for CacheKey {
    fn to_cache_key(&self) -> Result<CacheKey> {
        Ok(self.clone())
    }
}

macro_rules! tuple_to_cache_key {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Serialize),+> ToCacheKey for ($($name,)+) {
            fn to_cache_key(&self) -> Result<CacheKey> {
                let mut key = CacheKey::new();
                $(key.push(&self.$idx)?;)+
                Ok(key)
            }
        }
    };
}

tuple_to_cache_key!(A: 0);
tuple_to_cache_key!(A: 0, B: 1);
tuple_to_cache_key!(A: 0, B: 1, C: 2);
tuple_to_cache_key!(A: 0, B: 1, C: 2, D: 3);
tuple_to_cache_key!(A: 0, B: 1, C: 2, D: 3, E: 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = CacheKey::new().with(&"parse").unwrap().with(&7u32).unwrap();
        let b = CacheKey::new().with(&"parse").unwrap().with(&7u32).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn digest_is_order_sensitive() {
        let ab = CacheKey::of(&["a", "b"]).unwrap();
        let ba = CacheKey::of(&["b", "a"]).unwrap();
        assert_ne!(ab.digest(), ba.digest());
    }

    #[test]
    fn component_boundaries_matter() {
        let split = CacheKey::of(&["ab", "c"]).unwrap();
        let joined = CacheKey::of(&["a", "bc"]).unwrap();
        assert_ne!(split.digest(), joined.digest());
    }

    #[test]
    fn tuples_convert() {
        let key = ("lemmatize", "Die Katze", 3u8).to_cache_key().unwrap();
        assert_eq!(key.len(), 3);

        let manual = CacheKey::new()
            .with(&"lemmatize")
            .unwrap()
            .with(&"Die Katze")
            .unwrap()
            .with(&3u8)
            .unwrap();
        assert_eq!(key.digest(), manual.digest());
    }
}
