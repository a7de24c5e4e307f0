//! Versioned repository layer for Antigravity Sync
//!
//! Wraps `git2` behind [`VcsRepo`]: clone-or-init, credential-free remote
//! configuration, fetch, linear pull with local-change preservation, staging,
//! no-op-aware commits and push. Every operation takes the process-wide git
//! gate so only one touches repository state at a time.

pub mod auth;
pub mod error;
pub mod history;
pub mod repo;
pub mod tree;

pub use auth::{RemoteInfo, redact_url, strip_credentials, verify_access};
pub use error::{Error, Result};
pub use history::CommitInfo;
pub use repo::{PullOutcome, REMOTE_NAME, RepoStatus, VcsRepo};
pub use tree::BlobInfo;
