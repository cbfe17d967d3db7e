use std::{collections::BTreeSet, sync::Mutex};

use keyring::Entry;
use locksmith_core::store::{CredentialStore, StoreError};
use tracing::{debug, instrument};

use crate::presence::PresenceGate;

/// Account holding the JSON list of key names; the OS APIs cannot enumerate entries.
pub const INDEX_ACCOUNT: &str = "locksmith-index";

/// OS keyring-backed credential store (macOS keychain, Windows credential
/// manager, Linux Secret Service mirrored into the kernel keyring) through the
/// `keyring` crate. Every backend keeps entries until they are deleted.
///
/// Gated calls run the configured [`PresenceGate`] before touching the keyring.
pub struct KeyringCredentialStore<G: PresenceGate> {
    gate: G,
    index_lock: Mutex<()>,
}

impl<G: PresenceGate> KeyringCredentialStore<G> {
    pub fn new(gate: G) -> Self {
        Self {
            gate,
            index_lock: Mutex::new(()),
        }
    }

    fn gate(&self, require_auth: bool, prompt: &str) -> Result<(), StoreError> {
        if require_auth {
            self.gate.verify(prompt)?;
        }
        Ok(())
    }

    fn read_index(&self, namespace: &str) -> Result<BTreeSet<String>, StoreError> {
        match entry(namespace, INDEX_ACCOUNT)?.get_secret() {
            Ok(raw) => decode_index(&raw),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn update_index(
        &self,
        namespace: &str,
        edit: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        let mut index = self.read_index(namespace)?;
        if !edit(&mut index) {
            return Ok(());
        }
        entry(namespace, INDEX_ACCOUNT)?
            .set_secret(&encode_index(&index)?)
            .map_err(keyring_err)
    }
}

impl<G: PresenceGate> CredentialStore for KeyringCredentialStore<G> {
    #[instrument(skip_all, fields(key = %key, require_auth = require_auth))]
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        require_auth: bool,
    ) -> Result<(), StoreError> {
        reject_reserved(key)?;
        self.gate(require_auth, &format!("Authentication required to store '{key}'"))?;

        let item = entry(namespace, key)?;
        match item.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(err) => return Err(keyring_err(err)),
        }
        item.set_secret(value).map_err(keyring_err)?;
        self.update_index(namespace, |index| index.insert(key.to_string()))?;
        debug!("stored credential");
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key, require_auth = require_auth))]
    fn get(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<u8>, StoreError> {
        reject_reserved(key)?;
        self.gate(require_auth, prompt)?;
        match entry(namespace, key)?.get_secret() {
            Ok(bytes) => Ok(bytes),
            Err(keyring::Error::NoEntry) => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(keyring_err(err)),
        }
    }

    #[instrument(skip_all, fields(key = %key, require_auth = require_auth))]
    fn delete(
        &self,
        namespace: &str,
        key: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<(), StoreError> {
        reject_reserved(key)?;
        self.gate(require_auth, prompt)?;
        match entry(namespace, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(err) => return Err(keyring_err(err)),
        }
        self.update_index(namespace, |index| index.remove(key))
    }

    #[instrument(skip_all, fields(require_auth = require_auth))]
    fn list(
        &self,
        namespace: &str,
        require_auth: bool,
        prompt: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.gate(require_auth, prompt)?;
        Ok(self.read_index(namespace)?.into_iter().collect())
    }
}

fn entry(namespace: &str, key: &str) -> Result<Entry, StoreError> {
    Entry::new(namespace, key).map_err(keyring_err)
}

fn reject_reserved(key: &str) -> Result<(), StoreError> {
    if key == INDEX_ACCOUNT {
        return Err(StoreError::Storage {
            reason: format!("'{INDEX_ACCOUNT}' is reserved"),
        });
    }
    Ok(())
}

fn decode_index(raw: &[u8]) -> Result<BTreeSet<String>, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Storage {
        reason: format!("corrupt key index: {e}"),
    })
}

fn encode_index(index: &BTreeSet<String>) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(index).map_err(|e| StoreError::Storage {
        reason: format!("key index encode failed: {e}"),
    })
}

fn keyring_err(err: keyring::Error) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}
