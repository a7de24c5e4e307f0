//! Sync engine for Antigravity Sync
//!
//! Ties the filesystem and repository layers together: configuration and
//! credential storage, the shared-password gate, Smart Merge for divergent
//! histories, and the [`SyncOrchestrator`] state machine with its interval
//! scheduler and debounced file watcher.

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod merge;
pub mod orchestrator;
pub mod password;
pub mod scheduler;
pub mod watcher;

pub use config::{ConfigProvider, MemoryConfigProvider, MergePolicy, SyncConfig, TomlConfigProvider};
#[cfg(feature = "keyring")]
pub use credentials::KeyringCredentialStore;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use events::{EventBus, Severity, SkipReason, SyncEvent, SyncState};
pub use merge::{ConflictResolver, MergeReport};
pub use orchestrator::{
    CommitEntry, DetailedStatus, InitReport, SyncOrchestrator, SyncOutcome, SyncReport, SyncStatus,
};
pub use password::{PasswordCheck, PasswordRecord};
pub use scheduler::{CountdownCallback, Schedule, Scheduler};
pub use watcher::{DebouncedWatcher, Debouncer};

// Re-exported so front ends need not depend on the lower layers for stats.
pub use agsync_fs::{PullStats, PushStats};
