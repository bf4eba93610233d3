use thiserror::Error;

/// Main error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Deleting a key that was never cached is a caller error.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The wrapped compute function failed. Nothing is cached; the original
    /// error chain is preserved.
    #[error("compute failed: {0}")]
    Compute(anyhow::Error),

    /// Encoding a value for persistence failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored entry could not be decoded. Raised on the read path so that
    /// corruption never masquerades as a miss.
    #[error("corrupt cache entry: {0}")]
    CorruptEntry(String),

    /// The backing store (filesystem or remote service) failed.
    #[error("backing store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::StoreUnavailable(e.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_store_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::StoreUnavailable(_)));
    }

    #[test]
    fn compute_errors_keep_their_message() {
        let err = CacheError::Compute(anyhow::anyhow!("tagger offline"));
        assert!(err.to_string().contains("tagger offline"));
    }
}
