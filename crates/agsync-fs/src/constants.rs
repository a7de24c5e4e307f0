//! Constants and enums for on-disk sync layout.

use std::path::Path;

/// Well-known names the engine reserves inside the repository and working
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPath {
    /// The `.git` directory
    GitDir,
    /// Metadata area inside the repository subdirectory
    SyncDir,
    /// Cross-process lock marker at the repository root
    LockFile,
    /// Shared password digest inside [`SyncPath::SyncDir`]
    PasswordFile,
    /// Engine-local area holding conflict artifacts
    ConflictsDir,
    /// Optional user ignore file at the working-directory root
    IgnoreFile,
    /// Default repository subdirectory holding synced folders
    DefaultSubdir,
}

impl SyncPath {
    /// Get the string representation of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitDir => ".git",
            Self::SyncDir => ".sync",
            Self::LockFile => ".sync.lock",
            Self::PasswordFile => "password.sha256",
            Self::ConflictsDir => ".sync-conflicts",
            Self::IgnoreFile => ".syncignore",
            Self::DefaultSubdir => ".antigravity-sync",
        }
    }
}

impl AsRef<Path> for SyncPath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for SyncPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for SyncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marker embedded in Smart Merge artifact names.
pub const CONFLICT_MARKER: &str = ".conflict-";

/// Marker embedded in pull-time local-newer artifact names.
pub const REMOTE_MARKER: &str = ".remote-";
