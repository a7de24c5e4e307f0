//! Shared sync-password record
//!
//! Replicas joining the same sync group prove it by hashing the same
//! password. Only the hex digest is stored, in `.sync/password.sha256`
//! inside the repository's data root.

use std::path::{Path, PathBuf};

use agsync_fs::checksum::sha256_hex;
use agsync_fs::{SyncPath, io};
use tracing::{debug, info};

use crate::{Error, Result};

const SALT: &str = "agsync-v1:";

/// Hex SHA-256 of the salted password.
pub fn hash_password(password: &str) -> String {
    sha256_hex(format!("{SALT}{password}").as_bytes())
}

/// What [`PasswordRecord::verify_or_establish`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    /// The stored hash matches
    Verified,
    /// No hash was stored; ours was written
    Established,
}

/// The on-disk password hash of one repository.
#[derive(Debug, Clone)]
pub struct PasswordRecord {
    path: PathBuf,
}

impl PasswordRecord {
    /// Record inside the `.sync/` directory `metadata_dir`.
    pub fn new(metadata_dir: &Path) -> Self {
        Self {
            path: metadata_dir.join(SyncPath::PasswordFile),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// The stored digest, if any.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the stored digest with the hash of `password`.
    pub fn write(&self, password: &str) -> Result<()> {
        let line = format!("{}\n", hash_password(password));
        io::write_restricted(&self.path, line.as_bytes())?;
        info!(path = %self.path.display(), "Wrote sync password hash");
        Ok(())
    }

    /// Compare against the stored hash, writing ours when none exists.
    pub fn verify_or_establish(&self, password: &str) -> Result<PasswordCheck> {
        match self.read()? {
            Some(stored) if stored.eq_ignore_ascii_case(&hash_password(password)) => {
                debug!("Sync password verified");
                Ok(PasswordCheck::Verified)
            }
            Some(_) => Err(Error::PasswordMismatch),
            None => {
                self.write(password)?;
                Ok(PasswordCheck::Established)
            }
        }
    }
}
