//! Durable persistence of the signed-in user and credential.
//!
//! `SessionStore` is the only component that touches durable storage. It
//! keeps two keys in a `KeyValueStore` backend:
//!
//! - `user`: the user record as JSON
//! - `token`: the raw credential string
//!
//! Backends: `FileStore` (one file per key), `KeyringStore` (OS keychain) and
//! `MemoryStore` (in-process, shared between clones).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{Credential, User};

/// Key holding the serialized user record
pub const USER_KEY: &str = "user";

/// Key holding the raw credential string
pub const CREDENTIAL_KEY: &str = "token";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Failed to serialize user record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),
}

/// Minimal durable key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Stores each key as a file in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Stores each key as a secret in the OS keychain
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

// ============================================================================
// Session Store
// ============================================================================

/// A persisted session as read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user: User,
    pub credential: Credential,
}

pub struct SessionStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Load the persisted session.
    ///
    /// Returns `None` when nothing usable is stored. A half-written or
    /// unparsable session is cleared so the next start is clean. A backend
    /// that cannot be read right now leaves storage untouched.
    pub fn load(&self) -> Option<StoredSession> {
        match self.read() {
            Ok(stored) => stored,
            Err(e @ StoreError::Corrupt(_)) => {
                warn!(error = %e, "Discarding unusable stored session");
                if let Err(e) = self.clear() {
                    warn!(error = %e, "Failed to clear unusable stored session");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored session");
                None
            }
        }
    }

    fn read(&self) -> Result<Option<StoredSession>, StoreError> {
        let user = self.backend.get(USER_KEY)?;
        let credential = self.backend.get(CREDENTIAL_KEY)?;

        match (user, credential) {
            (None, None) => Ok(None),
            (Some(user), Some(credential)) => {
                let user: User = serde_json::from_str(&user)
                    .map_err(|e| StoreError::Corrupt(format!("user record: {}", e)))?;
                if credential.trim().is_empty() {
                    return Err(StoreError::Corrupt("empty credential".to_string()));
                }
                debug!(user_id = %user.id, "Loaded stored session");
                Ok(Some(StoredSession {
                    user,
                    credential: Credential::new(credential.trim()),
                }))
            }
            (Some(_), None) => Err(StoreError::Corrupt("credential missing".to_string())),
            (None, Some(_)) => Err(StoreError::Corrupt("user record missing".to_string())),
        }
    }

    /// Persist user and credential, overwriting previous contents
    pub fn save(&self, user: &User, credential: &Credential) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(user)?;
        self.backend.set(USER_KEY, &user_json)?;
        self.backend.set(CREDENTIAL_KEY, credential.as_str())?;
        debug!(user_id = %user.id, "Saved session");
        Ok(())
    }

    /// Replace only the user record
    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(user)?;
        self.backend.set(USER_KEY, &user_json)
    }

    /// Remove both keys. Both removals are attempted even if the first fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        let user = self.backend.remove(USER_KEY);
        let credential = self.backend.remove(CREDENTIAL_KEY);
        user.and(credential)
    }
}
