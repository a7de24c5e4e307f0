//! Error types for agsync-core

/// Result type for agsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in agsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Repository URL, token or password missing or unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The remote rejected our credentials
    #[error("Access denied to {url}: {message}")]
    Access { url: String, message: String },

    /// The remote repository does not exist or cannot be reached
    #[error("Repository not found: {url}: {message}")]
    NotFound { url: String, message: String },

    /// The local password does not match the one stored in the repository
    #[error("Sync password does not match the password stored in the repository")]
    PasswordMismatch,

    /// Smart Merge could not publish a result, even after a retry
    #[error("Smart Merge failed: {message}")]
    MergeFailure { message: String },

    /// Transient connectivity failure
    #[error("Network error talking to {url}: {message}")]
    Network { url: String, message: String },

    /// Credential store failure
    #[error("Credential store error: {message}")]
    Credentials { message: String },

    /// File watcher failure
    #[error(transparent)]
    Watch(#[from] notify::Error),

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from agsync-fs
    #[error(transparent)]
    Fs(#[from] agsync_fs::Error),

    /// Git error from agsync-git that has no more specific meaning here
    #[error(transparent)]
    Git(agsync_git::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Transient failures the next scheduled run retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<agsync_git::Error> for Error {
    fn from(err: agsync_git::Error) -> Self {
        match err {
            agsync_git::Error::Auth { url, message } => Self::Access { url, message },
            agsync_git::Error::RemoteNotFound { url, message } => Self::NotFound { url, message },
            agsync_git::Error::Network { url, message } => Self::Network { url, message },
            agsync_git::Error::StashNotRestored { message } => Self::MergeFailure {
                message: format!("local changes remain in the stash: {message}"),
            },
            agsync_git::Error::Fs(e) => Self::Fs(e),
            other => Self::Git(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_auth_maps_to_access() {
        let err: Error = agsync_git::Error::Auth {
            url: "https://example.com/r.git".into(),
            message: "401".into(),
        }
        .into();
        assert!(matches!(err, Error::Access { .. }));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn git_network_is_transient() {
        let err: Error = agsync_git::Error::Network {
            url: "u".into(),
            message: "reset".into(),
        }
        .into();
        assert!(err.is_transient());
        assert!(!Error::PasswordMismatch.is_transient());
    }

    #[test]
    fn stranded_stash_is_a_merge_failure() {
        let err: Error = agsync_git::Error::StashNotRestored {
            message: "1 conflict prevents checkout".into(),
        }
        .into();
        assert!(matches!(err, Error::MergeFailure { .. }));
        assert!(err.to_string().contains("remain in the stash"));
    }
}
