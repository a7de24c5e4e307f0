//! Token and password storage
//!
//! The repository token is keyed by the credential-free repository URL; the
//! sync password by `password:<url>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agsync_fs::io;
use agsync_git::strip_credentials;
use tracing::debug;

use crate::{Error, Result};

/// Key under which the token for `url` is stored.
pub fn token_key(url: &str) -> String {
    strip_credentials(url).trim_end_matches('/').to_string()
}

/// Key under which the sync password for `url` is stored.
pub fn password_key(url: &str) -> String {
    format!("password:{}", token_key(url))
}

/// Secret storage with get/set/delete semantics.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// JSON map in a file only the owner can read.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    gate: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    /// `<config dir>/agsync/credentials.json`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| Error::config("no configuration directory on this platform"))?;
        Ok(Self::new(dir.join("agsync").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_vec_pretty(entries)?;
        io::write_restricted(&self.path, &content)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _g = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _g = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)?;
        debug!(key = key, "Stored credential");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _g = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
            debug!(key = key, "Deleted credential");
        }
        Ok(())
    }
}

/// OS keychain via the `keyring` crate.
#[cfg(feature = "keyring")]
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
}

#[cfg(feature = "keyring")]
impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self {
            service_name: "agsync".to_string(),
        }
    }
}

#[cfg(feature = "keyring")]
impl KeyringCredentialStore {
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name, key).map_err(map_keyring_error)
    }
}

#[cfg(feature = "keyring")]
fn map_keyring_error(e: keyring::Error) -> Error {
    Error::Credentials {
        message: e.to_string(),
    }
}

#[cfg(feature = "keyring")]
impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value).map_err(map_keyring_error)?;
        debug!(key = key, "Stored credential in keyring");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}
