use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::secret::Secret;

/// Errors produced by local secret caches.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key resolves outside the cache root. Never sanitized.
    #[error("security: path traversal attempt detected for key {key:?}")]
    TraversalAttempt { key: String },
    /// Authentication tag mismatch, truncated entry, or a different master key.
    #[error("failed to decrypt cache item: {reason}")]
    DecryptionFailure { reason: String },
    #[error("failed to encrypt cache item: {reason}")]
    Encryption { reason: String },
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fast local mirror of secrets so reads inside the TTL skip the presence check.
pub trait SecretCache: Send + Sync {
    fn set(&self, key: &str, secret: &Secret) -> Result<(), CacheError>;

    /// `Ok(None)` when nothing is cached for `key`.
    fn get(&self, key: &str) -> Result<Option<Secret>, CacheError>;

    /// Remove a cached entry. A missing entry is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// True when the entry is missing, invalid, or older than `ttl`.
    fn is_expired(&self, key: &str, ttl: Duration) -> bool;
}

impl<T: SecretCache + ?Sized> SecretCache for Arc<T> {
    fn set(&self, key: &str, secret: &Secret) -> Result<(), CacheError> {
        (**self).set(key, secret)
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, CacheError> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key)
    }

    fn is_expired(&self, key: &str, ttl: Duration) -> bool {
        (**self).is_expired(key, ttl)
    }
}
