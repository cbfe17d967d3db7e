use locksmith_core::{cache::CacheError, store::StoreError};
use locksmith_storage::key_provider::KeyError;
use thiserror::Error;

/// Errors surfaced by [`crate::Locksmith`].
///
/// Credential store errors pass through unchanged; cache errors only appear
/// when opening the cache, never from reads or writes.
#[derive(Debug, Error)]
pub enum LocksmithError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cache unavailable: {0}")]
    Cache(#[from] CacheError),
    #[error("master key unavailable: {0}")]
    KeyUnavailable(#[from] KeyError),
    #[error("stored secret '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("'{key}' is reserved for internal use")]
    ReservedKey { key: String },
    #[error("failed to serialize secret: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LocksmithError {
    /// True when the user declined the presence check and may simply retry.
    pub fn is_auth_canceled(&self) -> bool {
        matches!(self, LocksmithError::Store(StoreError::AuthCanceled))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LocksmithError::Store(StoreError::NotFound { .. }))
    }
}
