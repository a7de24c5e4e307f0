//! Error types for agsync-git

use std::path::PathBuf;

use git2::{ErrorClass, ErrorCode};

/// Result type for agsync-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in agsync-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] agsync_fs::Error),

    #[error("Authentication failed for {url}: {message}")]
    Auth { url: String, message: String },

    #[error("Remote repository {url} not found: {message}")]
    RemoteNotFound { url: String, message: String },

    #[error("Network error talking to {url}: {message}")]
    Network { url: String, message: String },

    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Cannot pull linearly: {message}")]
    Diverged { message: String },

    #[error("Merge conflict: {message}")]
    MergeConflict { message: String },

    #[error("Set-aside changes could not be restored and remain in the stash: {message}")]
    StashNotRestored { message: String },

    #[error("Push rejected: {message}")]
    PushRejected { message: String },

    #[error("Remote '{name}' not configured")]
    RemoteNotConfigured { name: String },
}

impl Error {
    /// Classify a libgit2 failure from a network operation against `url`.
    pub fn from_remote(err: git2::Error, url: &str) -> Self {
        let url = crate::auth::redact_url(url);
        let message = err.message().to_string();
        let lower = message.to_lowercase();

        if err.code() == ErrorCode::Auth
            || lower.contains("authentication")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("credentials")
        {
            return Self::Auth { url, message };
        }
        if err.code() == ErrorCode::NotFound
            || lower.contains("404")
            || lower.contains("not found")
            || lower.contains("does not appear to be a git repository")
        {
            return Self::RemoteNotFound { url, message };
        }
        if err.code() == ErrorCode::NotFastForward {
            return Self::PushRejected { message };
        }
        if matches!(
            err.class(),
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh | ErrorClass::Os
        ) {
            return Self::Network { url, message };
        }
        Self::Git(err)
    }

    /// Failures that mean a plain pull cannot complete and Smart Merge
    /// should take over.
    pub fn needs_smart_merge(&self) -> bool {
        match self {
            Self::Diverged { .. } | Self::MergeConflict { .. } => true,
            Self::Git(e) => matches!(
                e.code(),
                ErrorCode::Conflict | ErrorCode::MergeConflict | ErrorCode::Unmerged | ErrorCode::Locked
            ) || e.class() == ErrorClass::Index,
            _ => false,
        }
    }
}
