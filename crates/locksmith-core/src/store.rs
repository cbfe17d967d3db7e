use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use thiserror::Error;

/// Errors produced by credential store adapters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The user declined the presence check. Retrying is fine.
    #[error("authentication canceled by user")]
    AuthCanceled,
    /// The platform could not complete the presence check.
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },
    /// Requested key does not exist.
    #[error("secret not found: {key}")]
    NotFound { key: String },
    /// Underlying platform store failure.
    #[error("credential store failure: {reason}")]
    Storage { reason: String },
}

/// Authoritative, presence-gated secret storage (OS keychain in production).
///
/// Calls with `require_auth` block the current thread until the platform check
/// finishes or the user cancels it. There is no timeout.
pub trait CredentialStore: Send + Sync {
    /// Persist bytes under `namespace/key`, replacing any existing entry.
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        require_auth: bool,
    ) -> Result<(), StoreError>;

    /// Read the bytes stored under `namespace/key`.
    fn get(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<u8>, StoreError>;

    /// Remove an entry. A missing entry is not an error.
    fn delete(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<(), StoreError>;

    /// Names of every entry in `namespace`.
    fn list(
        &self,
        namespace: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<String>, StoreError>;
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        require_auth: bool,
    ) -> Result<(), StoreError> {
        (**self).set(namespace, key, value, require_auth)
    }

    fn get(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<u8>, StoreError> {
        (**self).get(namespace, key, require_auth, prompt)
    }

    fn delete(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<(), StoreError> {
        (**self).delete(namespace, key, require_auth, prompt)
    }

    fn list(
        &self,
        namespace: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<String>, StoreError> {
        (**self).list(namespace, require_auth, prompt)
    }
}

/// How the in-memory store answers presence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthBehavior {
    #[default]
    Approve,
    Cancel,
    Fail,
}

/// Operation kinds recorded by [`InMemoryCredentialStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Get,
    Delete,
    List,
}

/// One presence check the in-memory store was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRecord {
    pub op: StoreOp,
    pub key: Option<String>,
    pub prompt: String,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<(String, String), Vec<u8>>,
    auth: AuthBehavior,
    auth_log: Vec<AuthRecord>,
}

/// Credential store kept in process memory, for tests and smoke runs.
/// Clones share state so a test can keep a handle after moving one into a `Locksmith`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_auth_behavior(&self, behavior: AuthBehavior) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.auth = behavior;
        }
    }

    /// Every presence check requested so far, oldest first.
    pub fn auth_log(&self) -> Vec<AuthRecord> {
        self.inner
            .lock()
            .map(|inner| inner.auth_log.clone())
            .unwrap_or_default()
    }

    /// Number of presence-gated calls for a given operation.
    pub fn auth_count(&self, op: StoreOp) -> usize {
        self.auth_log().iter().filter(|r| r.op == op).count()
    }

    /// Raw stored bytes, bypassing any presence check.
    pub fn peek(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.entries.get(&entry_id(namespace, key)).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl Inner {
    fn authenticate(
        &mut self,
        require_auth: bool,
        op: StoreOp,
        key: Option<&str>,
        prompt: &str,
    ) -> Result<(), StoreError> {
        if !require_auth {
            return Ok(());
        }
        self.auth_log.push(AuthRecord {
            op,
            key: key.map(str::to_string),
            prompt: prompt.to_string(),
        });
        match self.auth {
            AuthBehavior::Approve => Ok(()),
            AuthBehavior::Cancel => Err(StoreError::AuthCanceled),
            AuthBehavior::Fail => Err(StoreError::AuthFailed {
                reason: "simulated presence check failure".to_string(),
            }),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        require_auth: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let prompt = format!("Authentication required to store '{key}'");
        inner.authenticate(require_auth, StoreOp::Set, Some(key), &prompt)?;

        let id = entry_id(namespace, key);
        inner.entries.remove(&id);
        inner.entries.insert(id, value.to_vec());
        Ok(())
    }

    fn get(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.lock()?;
        inner.authenticate(require_auth, StoreOp::Get, Some(key), prompt)?;
        inner
            .entries
            .get(&entry_id(namespace, key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn delete(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.authenticate(require_auth, StoreOp::Delete, Some(key), prompt)?;
        inner.entries.remove(&entry_id(namespace, key));
        Ok(())
    }

    fn list(
        &self,
        namespace: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock()?;
        inner.authenticate(require_auth, StoreOp::List, None, prompt)?;
        Ok(inner
            .entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

fn entry_id(namespace: &str, key: &str) -> (String, String) {
    (namespace.to_string(), key.to_string())
}
