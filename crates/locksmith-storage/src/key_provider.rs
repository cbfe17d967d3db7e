use std::{
    fmt,
    sync::{Arc, Mutex},
};

use locksmith_core::store::{CredentialStore, StoreError};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Reserved account holding the cache master key. Never surfaced by listings.
pub const MASTER_KEY_ACCOUNT: &str = "locksmith-master-cache-key";

/// Required master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// 256-bit symmetric key for the local cache. Wiped on drop; never log the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Accepts exactly 32 bytes; any other length is a configuration error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; MASTER_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength { len: bytes.len() })?;
        Ok(Self { bytes })
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid master key length: expected 32 bytes, got {len}")]
    InvalidLength { len: usize },
    #[error("generation error: {0}")]
    Generation(String),
}

/// Source of the cache master key (credential store in production; memory in tests).
pub trait MasterKeyProvider: Send + Sync {
    fn obtain(&self) -> Result<MasterKey, KeyError>;
}

/// Keeps a randomly generated key in the credential store under
/// [`MASTER_KEY_ACCOUNT`], without a presence check so the cache stays readable.
pub struct StoreKeyProvider<S: CredentialStore> {
    store: S,
    namespace: String,
}

impl<S: CredentialStore> StoreKeyProvider<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }
}

impl<S: CredentialStore> MasterKeyProvider for StoreKeyProvider<S> {
    fn obtain(&self) -> Result<MasterKey, KeyError> {
        match self.store.get(&self.namespace, MASTER_KEY_ACCOUNT, false, "") {
            Ok(mut stored) => {
                let key = MasterKey::from_slice(&stored);
                stored.zeroize();
                debug!("loaded cache master key");
                key
            }
            Err(StoreError::NotFound { .. }) => {
                let key = MasterKey::generate();
                self.store
                    .set(&self.namespace, MASTER_KEY_ACCOUNT, key.as_bytes(), false)?;
                info!("generated new cache master key");
                Ok(key)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<MasterKey>>>,
}

impl MasterKeyProvider for InMemoryKeyProvider {
    fn obtain(&self) -> Result<MasterKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        Ok(guard.get_or_insert_with(MasterKey::generate).clone())
    }
}
