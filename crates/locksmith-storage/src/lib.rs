//! Concrete storage for Locksmith: the master key providers, the AES-GCM encrypted
//! disk cache, and the OS keyring credential store with its presence gates.

pub mod disk_cache;
pub mod key_provider;
pub mod keyring_store;
pub mod presence;
