//! Core abstractions for Locksmith: the secret model, expiration classification,
//! and the contracts for the authoritative credential store and the local cache.
//! Nothing here touches the OS keyring or the filesystem.

pub mod cache;
pub mod secret;
pub mod store;
