use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
    time::{Duration, SystemTime},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use locksmith_core::{
    cache::{CacheError, SecretCache},
    secret::Secret,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::key_provider::MasterKey;

/// AES-GCM nonce length prefixed to every cache file.
pub const NONCE_LEN: usize = 12;

/// Encrypted file-per-secret cache implementing the shared `SecretCache` contract.
///
/// Each entry lives at `<root>/<key>` and holds `nonce ‖ ciphertext`. The file
/// modification time is the only age signal used for TTL checks.
pub struct DiskCache {
    root: PathBuf,
    key: MasterKey,
}

impl DiskCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn new(root: impl AsRef<Path>, key: MasterKey) -> Result<Self, CacheError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        restrict_dir(root)?;
        let root = fs::canonicalize(root)?;
        debug!(root = %root.display(), "opened disk cache");
        Ok(Self { root, key })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root, rejecting anything that could escape it.
    ///
    /// Keys are relative paths without `..`, root or prefix components; the
    /// resolved location must still sit strictly below the canonical root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let traversal = || CacheError::TraversalAttempt {
            key: key.to_string(),
        };
        if key.is_empty() || !is_plain_relative(Path::new(key)) {
            return Err(traversal());
        }

        let resolved = resolve_existing(&self.root.join(key));
        if resolved == self.root || !resolved.starts_with(&self.root) {
            return Err(traversal());
        }
        Ok(resolved)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CacheError> {
        Aes256Gcm::new_from_slice(self.key.as_bytes()).map_err(|e| CacheError::Encryption {
            reason: format!("cipher init failed: {e}"),
        })
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CacheError::Encryption {
                reason: e.to_string(),
            })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CacheError> {
        if data.len() < NONCE_LEN {
            return Err(CacheError::DecryptionFailure {
                reason: "data too short".to_string(),
            });
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| CacheError::DecryptionFailure {
                reason: e.to_string(),
            })
    }
}

impl SecretCache for DiskCache {
    #[instrument(skip_all, fields(key = %key))]
    fn set(&self, key: &str, secret: &Secret) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let plaintext = Zeroizing::new(serde_json::to_vec(secret)?);
        let blob = self.encrypt(&plaintext)?;
        write_atomic(&self.root, &path, &blob)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get(&self, key: &str) -> Result<Option<Secret>, CacheError> {
        let path = self.path_for(key)?;
        let blob = match fs::read(&path) {
            Ok(blob) => blob,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let plaintext = self.decrypt(&blob)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    #[instrument(skip_all, fields(key = %key))]
    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn is_expired(&self, key: &str, ttl: Duration) -> bool {
        let Ok(path) = self.path_for(key) else {
            return true;
        };
        let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
            return true;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age > ttl,
            // mtime in the future: treat as fresh
            Err(_) => false,
        }
    }
}

fn is_plain_relative(key: &Path) -> bool {
    key.components().all(|component| {
        !matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Canonicalize the longest existing ancestor so symlinks cannot redirect writes.
fn resolve_existing(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    let mut missing = Vec::new();
    let mut cursor = path;
    while let (Some(parent), Some(name)) = (cursor.parent(), cursor.file_name()) {
        missing.push(name.to_os_string());
        if let Ok(real) = fs::canonicalize(parent) {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        cursor = parent;
    }
    path.to_path_buf()
}

fn write_atomic(root: &Path, path: &Path, blob: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or(root);
    create_private_dirs(root, parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    restrict_file(tmp.as_file())?;
    tmp.write_all(blob)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

/// Create every missing directory between `root` and `dir`, each owner-only.
fn create_private_dirs(root: &Path, dir: &Path) -> Result<(), CacheError> {
    let Ok(relative) = dir.strip_prefix(root) else {
        return Ok(());
    };
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::create_dir(&current) {
            Ok(()) => restrict_dir(&current)?,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_dir(dir: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir(_dir: &Path) -> Result<(), CacheError> {
    Ok(())
}

#[cfg(unix)]
fn restrict_file(file: &fs::File) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file(_file: &fs::File) -> Result<(), CacheError> {
    Ok(())
}
