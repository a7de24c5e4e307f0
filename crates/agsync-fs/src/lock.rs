//! Cross-process sync lock
//!
//! A marker file created with `O_EXCL` semantics at the repository root.
//! Its body is the creation time in milliseconds since the Unix epoch; a
//! marker older than the staleness threshold is treated as abandoned.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::constants::SyncPath;
use crate::{Error, Result};

/// Markers older than this are reclaimed.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Creates and removes the `.sync.lock` marker.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    stale_after: Duration,
}

impl LockManager {
    /// Lock for the repository rooted at `repo_root`.
    pub fn new(repo_root: &Path) -> Self {
        Self::with_staleness(repo_root, DEFAULT_STALE_AFTER)
    }

    pub fn with_staleness(repo_root: &Path, stale_after: Duration) -> Self {
        Self {
            path: repo_root.join(SyncPath::LockFile),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock. `Ok(false)` means another sync holds it.
    pub fn acquire(&self) -> Result<bool> {
        if self.try_create()? {
            return Ok(true);
        }

        let age = self.marker_age();
        match age {
            Some(age) if age <= self.stale_after => {
                debug!(path = %self.path.display(), age_ms = age.as_millis() as u64, "Sync lock held");
                Ok(false)
            }
            _ => {
                warn!(path = %self.path.display(), "Reclaiming stale sync lock");
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(&self.path, e)),
                }
                self.try_create()
            }
        }
    }

    /// Take the lock and return a guard that releases it on drop.
    pub fn acquire_guard(&self) -> Result<Option<LockGuard>> {
        Ok(self.acquire()?.then(|| LockGuard {
            manager: self.clone(),
        }))
    }

    /// Remove the marker. Absence is not an error.
    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    /// Whether a marker currently exists, stale or not.
    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    fn try_create(&self) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(now_ms().to_string().as_bytes())
                    .map_err(|e| Error::io(&self.path, e))?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    /// Age from the embedded timestamp, falling back to the file mtime
    /// when the body is unreadable (e.g. a writer crashed mid-write).
    fn marker_age(&self) -> Option<Duration> {
        let created_ms = fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse::<u128>().ok())
            .or_else(|| {
                fs::metadata(&self.path)
                    .ok()?
                    .modified()
                    .ok()?
                    .duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_millis())
            })?;
        Some(Duration::from_millis(now_ms().saturating_sub(created_ms) as u64))
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Holds the sync lock for its lifetime.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release() {
            warn!(error = %e, "Failed to release sync lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockManager::new(dir.path());
        assert!(lock.acquire().unwrap());
        assert!(!lock.acquire().unwrap());
        lock.release().unwrap();
        assert!(lock.acquire().unwrap());
    }

    #[test]
    fn marker_body_is_epoch_millis() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockManager::new(dir.path());
        lock.acquire().unwrap();
        let body = fs::read_to_string(dir.path().join(".sync.lock")).unwrap();
        assert!(body.parse::<u128>().unwrap() > 1_600_000_000_000);
    }

    #[test]
    fn guard_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockManager::new(dir.path());
        {
            let guard = lock.acquire_guard().unwrap();
            assert!(guard.is_some());
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn release_tolerates_missing_marker() {
        let dir = tempfile::tempdir().unwrap();
        LockManager::new(dir.path()).release().unwrap();
    }
}
