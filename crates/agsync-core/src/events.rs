//! Event channel between the engine and whatever presents it
//!
//! The engine publishes [`SyncEvent`]s on a `tokio::sync::broadcast`
//! channel. Subscribers come and go independently; a slow subscriber sees
//! `RecvError::Lagged` and keeps going. Publishing with no subscribers is
//! fine and drops the event.

use std::fmt;
use std::time::Duration;

use agsync_fs::PullStats;
use serde::Serialize;
use tokio::sync::broadcast;

/// Orchestrator state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Pushing,
    Pulling,
    Synced,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Pushing => "pushing",
            Self::Pulling => "pulling",
            Self::Synced => "synced",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Why a sync did not run. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// This process is already syncing
    InProgress,
    /// Another process holds the repository lock
    LockHeld,
    /// Sync is switched off in the configuration
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("a sync is already running in this process"),
            Self::LockHeld => f.write_str("another process is syncing this repository"),
            Self::Disabled => f.write_str("sync is disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncEvent {
    StateChanged(SyncState),
    Log { message: String, severity: Severity },
    PullCompleted(PullStats),
    Pushed { commit: String },
    Skipped(SkipReason),
    /// Time left until the next scheduled sync
    Countdown(Duration),
}

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn log(&self, message: impl Into<String>, severity: Severity) {
        self.emit(SyncEvent::Log {
            message: message.into(),
            severity,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
