//! Secret lifecycle orchestration: the credential store is authoritative and
//! presence-gated, the encrypted disk cache avoids re-prompting within a TTL.

pub mod error;
pub mod key_locks;

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use locksmith_core::{
    cache::SecretCache,
    secret::{Secret, SecretMetadata},
    store::CredentialStore,
};
use locksmith_storage::{
    disk_cache::DiskCache,
    key_provider::{MasterKeyProvider, StoreKeyProvider, MASTER_KEY_ACCOUNT},
};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

pub use error::LocksmithError;
pub use key_locks::KeyLocks;

/// Credential store namespace identifying the application.
pub const DEFAULT_NAMESPACE: &str = "com.locksmith.keychain";

/// How long a cached entry is trusted without re-prompting.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

const LIST_PROMPT: &str = "Authentication required to list secrets";

/// Read-through/write-through composition of a credential store and a cache.
pub struct Locksmith<S: CredentialStore, C: SecretCache> {
    store: S,
    cache: C,
    namespace: String,
    cache_ttl: Duration,
    locks: Option<KeyLocks>,
}

impl<S: CredentialStore + Clone> Locksmith<S, DiskCache> {
    /// Obtain the master key from `store` and open the disk cache at `cache_root`.
    pub fn open(store: S, cache_root: impl AsRef<Path>) -> Result<Self, LocksmithError> {
        Self::open_in(store, DEFAULT_NAMESPACE, cache_root)
    }

    pub fn open_in(
        store: S,
        namespace: &str,
        cache_root: impl AsRef<Path>,
    ) -> Result<Self, LocksmithError> {
        let key = StoreKeyProvider::new(store.clone(), namespace).obtain()?;
        let cache = DiskCache::new(cache_root, key)?;
        Ok(Self::new(store, cache).with_namespace(namespace))
    }
}

impl<S: CredentialStore, C: SecretCache> Locksmith<S, C> {
    pub fn new(store: S, cache: C) -> Self {
        Self {
            store,
            cache,
            namespace: DEFAULT_NAMESPACE.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            locks: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Serialize same-key operations within this process.
    pub fn with_key_locks(mut self) -> Self {
        self.locks = Some(KeyLocks::new());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store a secret. The credential store write always requires presence;
    /// the cache write afterwards is best-effort.
    #[instrument(skip_all, fields(key = %key))]
    pub fn set(
        &self,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), LocksmithError> {
        ensure_not_reserved(key)?;
        let handle = self.locks.as_ref().map(|locks| locks.handle(key));
        let _guard = handle.as_deref().map(lock_ignoring_poison);

        let secret = Secret::new(value, expires_at);
        let payload = Zeroizing::new(serde_json::to_vec(&secret)?);
        self.store.set(&self.namespace, key, &payload, true)?;

        if let Err(err) = self.cache.set(key, &secret) {
            warn!(error = %err, "cache write failed; credential store remains authoritative");
        }
        Ok(())
    }

    /// Copy of the secret value; the caller owns (and wipes) the returned buffer.
    pub fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, LocksmithError> {
        let secret = self.get_with_metadata(key)?;
        Ok(Zeroizing::new(secret.value().to_vec()))
    }

    /// Whole secret including its timestamps, read through the cache.
    #[instrument(skip_all, fields(key = %key))]
    pub fn get_with_metadata(&self, key: &str) -> Result<Secret, LocksmithError> {
        ensure_not_reserved(key)?;
        let handle = self.locks.as_ref().map(|locks| locks.handle(key));
        let _guard = handle.as_deref().map(lock_ignoring_poison);

        if !self.cache.is_expired(key, self.cache_ttl) {
            match self.cache.get(key) {
                Ok(Some(secret)) => {
                    debug!("served from cache");
                    return Ok(secret);
                }
                Ok(None) => debug!("cache miss"),
                Err(err) => warn!(error = %err, "cache read failed; falling back to credential store"),
            }
        }

        let prompt = format!("Authentication required to access '{key}'");
        let raw = Zeroizing::new(self.store.get(&self.namespace, key, true, &prompt)?);
        let secret: Secret =
            serde_json::from_slice(&raw).map_err(|e| LocksmithError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if let Err(err) = self.cache.set(key, &secret) {
            warn!(error = %err, "cache refresh failed");
        }
        Ok(secret)
    }

    /// Every stored key with metadata when the cache happens to hold it.
    /// The master key account is never included.
    #[instrument(skip_all)]
    pub fn list(&self) -> Result<BTreeMap<String, Option<SecretMetadata>>, LocksmithError> {
        let keys = self.store.list(&self.namespace, true, LIST_PROMPT)?;
        Ok(keys
            .into_iter()
            .filter(|key| key != MASTER_KEY_ACCOUNT)
            .map(|key| {
                // metadata is not sensitive, so staleness does not matter here
                let metadata = match self.cache.get(&key) {
                    Ok(secret) => secret.map(|s| s.metadata()),
                    Err(err) => {
                        debug!(key = %key, error = %err, "no cached metadata");
                        None
                    }
                };
                (key, metadata)
            })
            .collect())
    }

    /// Remove a secret from the cache (best-effort) and the credential store.
    #[instrument(skip_all, fields(key = %key))]
    pub fn delete(&self, key: &str) -> Result<(), LocksmithError> {
        ensure_not_reserved(key)?;
        let handle = self.locks.as_ref().map(|locks| locks.handle(key));
        let _guard = handle.as_deref().map(lock_ignoring_poison);

        if let Err(err) = self.cache.delete(key) {
            warn!(error = %err, "cache delete failed");
        }
        let prompt = format!("Authentication required to delete '{key}'");
        self.store.delete(&self.namespace, key, true, &prompt)?;
        Ok(())
    }
}

fn ensure_not_reserved(key: &str) -> Result<(), LocksmithError> {
    if key == MASTER_KEY_ACCOUNT {
        return Err(LocksmithError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn lock_ignoring_poison(lock: &Mutex<()>) -> std::sync::MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc, thread, time::SystemTime};

    use chrono::Duration as ChronoDuration;
    use filetime::FileTime;
    use locksmith_core::{
        cache::CacheError,
        store::{AuthBehavior, InMemoryCredentialStore, StoreError, StoreOp},
    };
    use locksmith_storage::key_provider::MasterKey;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: InMemoryCredentialStore,
        locksmith: Locksmith<InMemoryCredentialStore, Arc<DiskCache>>,
        cache: Arc<DiskCache>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryCredentialStore::new();
        let cache = Arc::new(
            DiskCache::new(dir.path().join("cache"), MasterKey::generate()).expect("cache"),
        );
        let locksmith = Locksmith::new(store.clone(), Arc::clone(&cache));
        Fixture {
            _dir: dir,
            store,
            locksmith,
            cache,
        }
    }

    fn in_30_days() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(30)
    }

    /// Cache that fails every operation.
    struct BrokenCache;

    impl SecretCache for BrokenCache {
        fn set(&self, _key: &str, _secret: &Secret) -> Result<(), CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk full")))
        }

        fn get(&self, _key: &str) -> Result<Option<Secret>, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Io(std::io::Error::other("read-only")))
        }

        fn is_expired(&self, _key: &str, _ttl: Duration) -> bool {
            false
        }
    }

    #[test]
    fn set_then_get_is_served_from_cache() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok123", in_30_days()).expect("set");

        let value = fx.locksmith.get("svc").expect("get");
        assert_eq!(value.as_slice(), b"tok123");
        assert_eq!(fx.store.auth_count(StoreOp::Set), 1);
        assert_eq!(fx.store.auth_count(StoreOp::Get), 0);
    }

    #[test]
    fn store_payload_is_a_serialized_secret() {
        let fx = fixture();
        let expires = in_30_days();
        fx.locksmith.set("svc", b"tok123", expires).expect("set");

        let raw = fx.store.peek(DEFAULT_NAMESPACE, "svc").expect("stored");
        let stored: Secret = serde_json::from_slice(&raw).expect("json");
        assert_eq!(stored.value(), b"tok123");
        assert_eq!(stored.expires_at(), expires);
    }

    #[test]
    fn tampered_cache_falls_back_to_store() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok123", in_30_days()).expect("set");

        let path = fx.cache.path_for("svc").unwrap();
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        let value = fx.locksmith.get("svc").expect("fallback get");
        assert_eq!(value.as_slice(), b"tok123");
        assert_eq!(fx.store.auth_count(StoreOp::Get), 1);

        // the fallback refreshed the cache
        fx.locksmith.get("svc").expect("cached get");
        assert_eq!(fx.store.auth_count(StoreOp::Get), 1);
    }

    #[test]
    fn stale_cache_prompts_again() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok123", in_30_days()).expect("set");

        let path = fx.cache.path_for("svc").unwrap();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
        filetime::set_file_mtime(&path, FileTime::from_system_time(two_hours_ago)).unwrap();

        let value = fx.locksmith.get("svc").expect("get");
        assert_eq!(value.as_slice(), b"tok123");
        let log = fx.store.auth_log();
        let gets: Vec<_> = log.iter().filter(|r| r.op == StoreOp::Get).collect();
        assert_eq!(gets.len(), 1);
        assert_eq!(gets[0].prompt, "Authentication required to access 'svc'");
    }

    #[test]
    fn custom_ttl_is_honored() {
        let fx = fixture();
        let locksmith = Locksmith::new(fx.store.clone(), Arc::clone(&fx.cache))
            .with_cache_ttl(Duration::ZERO);
        locksmith.set("svc", b"v", in_30_days()).expect("set");

        let path = fx.cache.path_for("svc").unwrap();
        let a_second_ago = SystemTime::now() - Duration::from_secs(1);
        filetime::set_file_mtime(&path, FileTime::from_system_time(a_second_ago)).unwrap();

        locksmith.get("svc").expect("get");
        assert_eq!(fx.store.auth_count(StoreOp::Get), 1);
    }

    #[test]
    fn missing_secret_is_not_found() {
        let fx = fixture();
        let err = fx.locksmith.get("nope").expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn canceled_set_caches_nothing() {
        let fx = fixture();
        fx.store.set_auth_behavior(AuthBehavior::Cancel);

        let err = fx
            .locksmith
            .set("svc", b"tok", in_30_days())
            .expect_err("canceled");
        assert!(err.is_auth_canceled());
        assert!(fx.cache.get("svc").unwrap().is_none());
    }

    #[test]
    fn failed_auth_on_fallback_propagates() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok", in_30_days()).expect("set");
        fx.cache.delete("svc").unwrap();
        fx.store.set_auth_behavior(AuthBehavior::Fail);

        let err = fx.locksmith.get("svc").expect_err("auth failed");
        assert!(matches!(
            err,
            LocksmithError::Store(StoreError::AuthFailed { .. })
        ));
    }

    #[test]
    fn cache_failures_never_fail_reads_or_writes() {
        let store = InMemoryCredentialStore::new();
        let locksmith = Locksmith::new(store.clone(), BrokenCache);

        locksmith.set("svc", b"tok", in_30_days()).expect("set");
        let value = locksmith.get("svc").expect("get");
        assert_eq!(value.as_slice(), b"tok");
        assert_eq!(store.auth_count(StoreOp::Get), 1);

        locksmith.delete("svc").expect("delete");
        assert!(store.peek(DEFAULT_NAMESPACE, "svc").is_none());
    }

    #[test]
    fn corrupt_store_payload_is_reported() {
        let fx = fixture();
        fx.store
            .set(DEFAULT_NAMESPACE, "raw", b"not json", false)
            .unwrap();
        let err = fx.locksmith.get("raw").expect_err("corrupt");
        assert!(matches!(err, LocksmithError::Corrupt { .. }));
    }

    #[test]
    fn list_hides_master_key_and_uses_cached_metadata() {
        let fx = fixture();
        let expires = in_30_days();
        fx.locksmith.set("cached", b"a", expires).expect("set");
        fx.store
            .set(DEFAULT_NAMESPACE, MASTER_KEY_ACCOUNT, &[0u8; 32], false)
            .unwrap();
        let uncached = Secret::new(b"b".to_vec(), expires);
        fx.store
            .set(
                DEFAULT_NAMESPACE,
                "uncached",
                &serde_json::to_vec(&uncached).unwrap(),
                false,
            )
            .unwrap();

        let listed = fx.locksmith.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert!(!listed.contains_key(MASTER_KEY_ACCOUNT));
        assert_eq!(listed["cached"].map(|m| m.expires_at), Some(expires));
        assert_eq!(listed["uncached"], None);
        assert_eq!(fx.store.auth_count(StoreOp::List), 1);
    }

    #[test]
    fn delete_clears_cache_and_store() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok", in_30_days()).expect("set");
        fx.locksmith.delete("svc").expect("delete");

        assert!(fx.cache.get("svc").unwrap().is_none());
        assert!(fx.store.peek(DEFAULT_NAMESPACE, "svc").is_none());
        fx.locksmith.delete("svc").expect("delete is idempotent");
    }

    #[test]
    fn delete_returns_store_error() {
        let fx = fixture();
        fx.locksmith.set("svc", b"tok", in_30_days()).expect("set");
        fx.store.set_auth_behavior(AuthBehavior::Fail);

        let err = fx.locksmith.delete("svc").expect_err("store refuses");
        assert!(matches!(
            err,
            LocksmithError::Store(StoreError::AuthFailed { .. })
        ));
        assert!(fx.store.peek(DEFAULT_NAMESPACE, "svc").is_some());
    }

    #[test]
    fn reserved_account_is_off_limits() {
        let fx = fixture();
        for result in [
            fx.locksmith.set(MASTER_KEY_ACCOUNT, b"x", in_30_days()),
            fx.locksmith.get(MASTER_KEY_ACCOUNT).map(|_| ()),
            fx.locksmith.delete(MASTER_KEY_ACCOUNT),
        ] {
            assert!(matches!(result, Err(LocksmithError::ReservedKey { .. })));
        }
        assert!(fx.store.auth_log().is_empty());
    }

    #[test]
    fn traversal_key_still_reaches_the_store() {
        let fx = fixture();
        fx.locksmith
            .set("../escape", b"tok", in_30_days())
            .expect("store write is authoritative");
        assert!(fx.store.peek(DEFAULT_NAMESPACE, "../escape").is_some());
        assert!(!fx.cache.root().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn open_reuses_master_key_across_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(InMemoryCredentialStore::new());

        let first = Locksmith::open(Arc::clone(&store), dir.path()).expect("open");
        first.set("svc", b"tok", in_30_days()).expect("set");
        drop(first);

        let second = Locksmith::open(Arc::clone(&store), dir.path()).expect("reopen");
        assert_eq!(second.get("svc").expect("get").as_slice(), b"tok");
        assert_eq!(store.auth_count(StoreOp::Get), 0);
        assert!(!second.list().unwrap().contains_key(MASTER_KEY_ACCOUNT));
    }

    #[test]
    fn concurrent_callers_on_distinct_keys() {
        let fx = fixture();
        let locksmith = Arc::new(
            Locksmith::new(fx.store.clone(), Arc::clone(&fx.cache)).with_key_locks(),
        );

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let locksmith = Arc::clone(&locksmith);
                thread::spawn(move || {
                    let key = format!("key-{i}");
                    let value = format!("value-{i}");
                    locksmith
                        .set(&key, value.as_bytes(), in_30_days())
                        .expect("set");
                    let read = locksmith.get(&key).expect("get");
                    assert_eq!(read.as_slice(), value.as_bytes());
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker");
        }
        assert_eq!(locksmith.list().unwrap().len(), 8);
    }

    #[test]
    fn same_key_writer_and_reader_never_observe_a_torn_value() {
        let fx = fixture();
        let locksmith = Arc::new(
            Locksmith::new(fx.store.clone(), Arc::clone(&fx.cache)).with_key_locks(),
        );
        let written: Vec<String> = (0..50).map(|i| format!("value-{i:02}")).collect();
        locksmith
            .set("shared", written[0].as_bytes(), in_30_days())
            .expect("seed");

        let writer = {
            let locksmith = Arc::clone(&locksmith);
            let written = written.clone();
            thread::spawn(move || {
                for value in &written[1..] {
                    locksmith
                        .set("shared", value.as_bytes(), in_30_days())
                        .expect("set");
                }
            })
        };
        let reader = {
            let locksmith = Arc::clone(&locksmith);
            let written = written.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let read = locksmith.get("shared").expect("get");
                    assert!(
                        written.iter().any(|value| value.as_bytes() == read.as_slice()),
                        "unexpected value {:?}",
                        String::from_utf8_lossy(&read)
                    );
                }
            })
        };
        writer.join().expect("writer");
        reader.join().expect("reader");

        assert_eq!(fx.store.auth_count(StoreOp::Get), 0);
        assert_eq!(
            locksmith.get("shared").expect("final get").as_slice(),
            written[49].as_bytes()
        );
    }
}
