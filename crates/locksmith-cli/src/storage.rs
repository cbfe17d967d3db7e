use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use locksmith_lifecycle::Locksmith;
use locksmith_storage::{
    disk_cache::DiskCache, keyring_store::KeyringCredentialStore, presence::ConsoleGate,
};
use tracing::debug;

use crate::config::{self, Config};

pub type ProductionStore = Arc<KeyringCredentialStore<ConsoleGate>>;
pub type ProductionLocksmith = Locksmith<ProductionStore, DiskCache>;

/// Resolve the default cache directory (`~/.locksmith/cache`).
pub fn default_cache_dir() -> Result<PathBuf> {
    Ok(config::base_dir()?.join("cache"))
}

pub fn cache_dir(config: &Config) -> Result<PathBuf> {
    match &config.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_cache_dir(),
    }
}

/// Build a Locksmith backed by the OS keyring, gated on the terminal.
pub fn open(config: &Config) -> Result<ProductionLocksmith> {
    let root = cache_dir(config)?;
    debug!(root = %root.display(), "opening locksmith");
    let store = Arc::new(KeyringCredentialStore::new(ConsoleGate));
    Ok(Locksmith::open(store, root)?.with_key_locks())
}

/// Helper for tests to construct a Locksmith over an in-memory store and a temp cache.
#[cfg(test)]
pub fn test_locksmith(
    root: impl Into<PathBuf>,
) -> (
    Arc<locksmith_core::store::InMemoryCredentialStore>,
    Locksmith<Arc<locksmith_core::store::InMemoryCredentialStore>, DiskCache>,
) {
    use locksmith_storage::key_provider::{InMemoryKeyProvider, MasterKeyProvider};

    let store = Arc::new(locksmith_core::store::InMemoryCredentialStore::new());
    let key = InMemoryKeyProvider::default().obtain().expect("test key");
    let cache = DiskCache::new(root.into(), key).expect("test cache");
    (Arc::clone(&store), Locksmith::new(store, cache))
}
