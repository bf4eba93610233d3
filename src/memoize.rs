//! Function memoization
//!
//! Wraps an expensive function together with one cache instance. The
//! wrapper derives a [`CacheKey`] from the call arguments and routes the
//! call through [`Cache::fetch`], so repeated calls with equal arguments
//! invoke the function at most once per cache lifetime.

use crate::cache::Cache;
use crate::core::{Result, ToCacheKey};

/// A function fused with the cache that memoizes it
pub struct Memoized<C, F> {
    cache: C,
    func: F,
}

/// Build a memoized wrapper around `func`, backed by `cache`
pub fn memoize<C, F>(cache: C, func: F) -> Memoized<C, F> {
    Memoized { cache, func }
}

impl<C, F> Memoized<C, F> {
    /// Invoke the wrapped function through the cache.
    ///
    /// Arguments become the cache key; the function only runs on a miss.
    /// An `Ok(None)` result is returned but never cached.
    pub fn call<A, V>(&self, args: &A) -> Result<Option<V>>
    where
        A: ToCacheKey,
        C: Cache<V>,
        F: Fn(&A) -> anyhow::Result<Option<V>>,
    {
        let key = args.to_cache_key()?;
        self.cache.fetch(&key, || (self.func)(args))
    }

    /// The cache backing this wrapper
    pub fn cache(&self) -> &C {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::core::CacheKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn calls_the_function_once_per_key() {
        let calls = AtomicUsize::new(0);
        let concat = memoize(
            MemoryCache::<CacheKey, String>::new(0),
            |args: &(String, u32)| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(format!("{}-{}", args.0, args.1)))
            },
        );

        let args = ("doc".to_string(), 7u32);
        assert_eq!(concat.call(&args).unwrap().as_deref(), Some("doc-7"));
        assert_eq!(concat.call(&args).unwrap().as_deref(), Some("doc-7"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let other = ("doc".to_string(), 8u32);
        assert_eq!(concat.call(&other).unwrap().as_deref(), Some("doc-8"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_results_are_recomputed() {
        let calls = AtomicUsize::new(0);
        let lookup = memoize(
            MemoryCache::<CacheKey, String>::new(0),
            |_args: &(u32,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
        );

        assert!(lookup.call(&(1u32,)).unwrap().is_none());
        assert!(lookup.call(&(1u32,)).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
