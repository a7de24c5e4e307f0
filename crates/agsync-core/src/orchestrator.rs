//! The sync state machine
//!
//! [`SyncOrchestrator`] sequences locking, copying, pulling (with Smart Merge
//! as the fallback) and pushing into the public operations. Each operation
//! reloads the configuration, takes the in-process busy flag and then the
//! cross-process repository lock; both are released by guards on every exit
//! path, including errors.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agsync_fs::{
    ChangeCopyEngine, ConflictArea, CopyOptions, FilterEngine, InboundScope, LockGuard, LockManager,
    NormalizedPath, PullStats, PushStats,
};
use agsync_git::{CommitInfo, PullOutcome, VcsRepo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigProvider, SyncConfig};
use crate::credentials::{CredentialStore, password_key, token_key};
use crate::events::{EventBus, Severity, SkipReason, SyncEvent, SyncState};
use crate::merge::{ConflictResolver, MergeReport};
use crate::password::{PasswordCheck, PasswordRecord};
use crate::scheduler::{CountdownCallback, Schedule, Scheduler};
use crate::watcher::DebouncedWatcher;
use crate::{Error, Result};

/// Files listed in a detailed status preview.
pub const PREVIEW_LIMIT: usize = 10;

/// A sync either ran or was skipped for a benign reason.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T = SyncReport> {
    Completed(T),
    Skipped(SkipReason),
}

impl<T> SyncOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(t) => Some(t),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// What one sync, push or pull did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Working directory -> repository copy
    pub outbound: PushStats,
    /// Repository -> working directory copy
    pub inbound: PullStats,
    /// Present when Smart Merge had to run
    pub merge: Option<MergeReport>,
    /// Commit published by this run
    pub pushed: Option<String>,
}

/// What `initialize` did.
#[derive(Debug, Clone, PartialEq)]
pub struct InitReport {
    /// The repository was cloned from a populated remote
    pub cloned: bool,
    /// Full reconciliation of a fresh clone into the working directory
    pub inbound: Option<PullStats>,
    pub outbound: PushStats,
    pub password: Option<PasswordCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub configured: bool,
    pub state: SyncState,
    /// Changes not yet committed: local edits plus uncommitted repo paths
    pub pending_changes: usize,
    /// Local commits not on the remote, as of the last fetch
    pub ahead: usize,
    /// Remote commits not yet pulled, as of the last fetch
    pub behind: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_sync_in: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedStatus {
    pub status: SyncStatus,
    /// Up to [`PREVIEW_LIMIT`] pending paths, repository-relative
    pub preview: Vec<String>,
    pub conflict_artifacts: usize,
    pub last_pull: Option<PullStats>,
    /// Most recent commits, newest first
    pub recent_commits: Vec<CommitEntry>,
}

/// Serializable view of a commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitEntry {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl From<CommitInfo> for CommitEntry {
    fn from(c: CommitInfo) -> Self {
        Self {
            hash: c.hash,
            message: c.message,
            author: c.author,
            timestamp: c.timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct StatusCell {
    state: SyncState,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_pull: Option<PullStats>,
}

#[derive(Debug, Default)]
struct AutoSync {
    scheduler: Option<Scheduler>,
    watcher: Option<DebouncedWatcher>,
}

/// Clears the in-process busy flag on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything one operation works with, built from a fresh config.
struct Session {
    config: SyncConfig,
    repo: VcsRepo,
    copier: ChangeCopyEngine,
    /// Cloned by this operation; the working directory has not seen it yet
    cloned: bool,
}

/// Top-level sync engine.
pub struct SyncOrchestrator {
    config: Arc<dyn ConfigProvider>,
    credentials: Arc<dyn CredentialStore>,
    events: EventBus,
    is_syncing: AtomicBool,
    status: Mutex<StatusCell>,
    schedule: Arc<Schedule>,
    auto: Mutex<AutoSync>,
    /// Runs right before each publish; lets tests move the remote under us
    #[cfg(test)]
    before_push: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("is_syncing", &self.is_syncing)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(config: Arc<dyn ConfigProvider>, credentials: Arc<dyn CredentialStore>, events: EventBus) -> Self {
        Self {
            config,
            credentials,
            events,
            is_syncing: AtomicBool::new(false),
            status: Mutex::new(StatusCell::default()),
            schedule: Arc::new(Schedule::default()),
            auto: Mutex::new(AutoSync::default()),
            #[cfg(test)]
            before_push: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn fire_before_push(&self) {
        if let Some(hook) = self.before_push.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            hook();
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> SyncState {
        self.cell().state
    }

    fn cell(&self) -> std::sync::MutexGuard<'_, StatusCell> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: SyncState) {
        self.cell().state = state;
        self.events.emit(SyncEvent::StateChanged(state));
    }

    fn begin(&self) -> Option<BusyGuard<'_>> {
        self.is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.is_syncing))
    }

    fn skip<T>(&self, reason: SkipReason) -> Result<SyncOutcome<T>> {
        info!(reason = %reason, "Sync skipped");
        self.events.emit(SyncEvent::Skipped(reason));
        Ok(SyncOutcome::Skipped(reason))
    }

    fn token_for(&self, url: &str) -> Result<String> {
        self.credentials
            .get(&token_key(url))?
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::config(format!("no access token stored for {url}")))
    }

    fn copier(&self, config: &SyncConfig) -> Result<ChangeCopyEngine> {
        let filter = FilterEngine::for_root(&config.local_path, &config.exclude_patterns)?;
        Ok(ChangeCopyEngine::new(
            &config.local_path,
            config.mirror_root(),
            config.folders.clone(),
            filter,
            ConflictArea::new(&config.repository_path),
            CopyOptions {
                mtime_tolerance_ms: config.policy.mtime_tolerance_ms,
                device_tag: config.device_name.clone(),
            },
        ))
    }

    fn lock(&self, config: &SyncConfig) -> Result<Option<LockGuard>> {
        let manager = LockManager::with_staleness(&config.repository_path, config.policy.lock_stale_after());
        Ok(manager.acquire_guard()?)
    }

    /// Open the session for a sync-type operation, initialising the
    /// repository on first use. Callers hold the repository lock.
    fn session(&self, config: SyncConfig) -> Result<Session> {
        let url = config.require_url()?.to_string();
        let token = self.token_for(&url)?;
        let (repo, cloned) = if config.repository_path.join(".git").exists() {
            (VcsRepo::open(&config.repository_path, &url, Some(token))?, false)
        } else {
            info!("Repository missing; initialising before sync");
            let password = self.stored_password(&config, &url)?;
            let ensured = VcsRepo::ensure(&config.repository_path, &url, Some(token), &config.branch)?;
            std::fs::create_dir_all(config.metadata_dir())?;
            if let Some(pw) = password {
                PasswordRecord::new(&config.metadata_dir()).verify_or_establish(&pw)?;
            }
            ensured
        };
        let repo = repo.with_author(config.device_name.clone());
        let copier = self.copier(&config)?;
        Ok(Session {
            config,
            repo,
            copier,
            cloned,
        })
    }

    /// The group password, when password protection is on.
    fn stored_password(&self, config: &SyncConfig, url: &str) -> Result<Option<String>> {
        if !config.sync_password_enabled {
            return Ok(None);
        }
        self.credentials
            .get(&password_key(url))?
            .ok_or_else(|| Error::config("sync password is enabled but none is stored"))
            .map(Some)
    }

    // ----- initialize / connect / disconnect -----

    /// Validate configuration and credentials, open or create the
    /// repository, provision its metadata area, check the shared password
    /// and copy local content in.
    ///
    /// Configuration-class failures (missing or rejected credentials, wrong
    /// password, unknown repository) roll back the saved URL, token and
    /// password so the engine is never left half configured.
    pub fn initialize(&self) -> Result<SyncOutcome<InitReport>> {
        let config = self.config.load()?;
        let url = config.repository_url.clone();
        match self.initialize_with(config) {
            Err(e) if Self::invalidates_config(&e) => {
                warn!(error = %e, "Initialisation failed; rolling back configuration");
                if let Some(url) = url {
                    self.rollback(&url);
                }
                Err(e)
            }
            other => other,
        }
    }

    fn invalidates_config(err: &Error) -> bool {
        matches!(
            err,
            Error::Configuration { .. } | Error::Access { .. } | Error::NotFound { .. } | Error::PasswordMismatch
        )
    }

    fn initialize_with(&self, config: SyncConfig) -> Result<SyncOutcome<InitReport>> {
        config.validate()?;
        let url = config.require_url()?.to_string();
        let token = self.token_for(&url)?;
        let password = self.stored_password(&config, &url)?;

        let Some(_busy) = self.begin() else {
            return self.skip(SkipReason::InProgress);
        };

        let Some(_lock) = self.lock(&config)? else {
            return self.skip(SkipReason::LockHeld);
        };
        let (repo, cloned) = VcsRepo::ensure(&config.repository_path, &url, Some(token), &config.branch)?;
        let repo = repo.with_author(config.device_name.clone());

        std::fs::create_dir_all(config.metadata_dir())?;
        std::fs::create_dir_all(&config.local_path)?;

        let password = match password {
            Some(pw) => Some(PasswordRecord::new(&config.metadata_dir()).verify_or_establish(&pw)?),
            None => None,
        };

        let copier = self.copier(&config)?;
        let inbound = if cloned {
            let stats = copier.copy_repo_to_local(None)?;
            self.cell().last_pull = Some(stats);
            Some(stats)
        } else {
            None
        };
        let outbound = copier.copy_local_to_repo()?;
        repo.commit_all(&format!("Initial sync from {}", config.device_name))?;

        info!(cloned, copied = outbound.copied, "Initialised");
        self.events.log("Sync repository ready", Severity::Info);
        self.set_state(SyncState::Idle);
        Ok(SyncOutcome::Completed(InitReport {
            cloned,
            inbound,
            outbound,
            password,
        }))
    }

    /// Verify access with `token`, store the URL and credentials, then
    /// initialise. Nothing is persisted if verification fails, and
    /// everything written is removed if initialisation fails.
    pub fn connect(&self, url: &str, token: &str, password: Option<&str>) -> Result<SyncOutcome<InitReport>> {
        let url = agsync_git::strip_credentials(url);
        agsync_git::verify_access(&url, Some(token))?;

        let result = self.persist_connection(&url, token, password).and_then(|()| self.initialize());
        if result.is_err() {
            self.rollback(&url);
        }
        result
    }

    fn persist_connection(&self, url: &str, token: &str, password: Option<&str>) -> Result<()> {
        self.credentials.set(&token_key(url), token)?;
        match password {
            Some(pw) => self.credentials.set(&password_key(url), pw)?,
            None => self.credentials.delete(&password_key(url))?,
        }
        let mut config = self.config.load()?;
        config.repository_url = Some(url.to_string());
        config.sync_password_enabled = password.is_some();
        self.config.save(&config)
    }

    fn rollback(&self, url: &str) {
        for key in [token_key(url), password_key(url)] {
            if let Err(e) = self.credentials.delete(&key) {
                warn!(error = %e, "Failed to remove credential during rollback");
            }
        }
        if let Err(e) = self.config.clear_repository_url() {
            warn!(error = %e, "Failed to clear repository URL during rollback");
        }
    }

    /// Stop automatic sync and forget the remote. Content on disk is kept.
    pub fn disconnect(&self) -> Result<()> {
        self.stop_auto_sync();
        let config = self.config.load()?;
        if let Some(url) = &config.repository_url {
            self.credentials.delete(&token_key(url))?;
            self.credentials.delete(&password_key(url))?;
        }
        self.config.clear_repository_url()?;
        self.set_state(SyncState::Idle);
        info!("Disconnected");
        Ok(())
    }

    // ----- sync / push / pull -----

    /// Pull then push under one lock. Contention is a skip, not an error.
    pub fn sync(&self) -> Result<SyncOutcome> {
        let config = self.config.load()?;
        if !config.enabled {
            return self.skip(SkipReason::Disabled);
        }
        self.guarded(config, SyncState::Syncing, |this, session| {
            this.set_state(SyncState::Pulling);
            let mut report = this.pull_phase(session)?;
            this.set_state(SyncState::Pushing);
            this.push_phase(session, &mut report)?;
            Ok(report)
        })
    }

    /// Publish local changes. Always pulls first.
    pub fn push(&self) -> Result<SyncOutcome> {
        let config = self.config.load()?;
        self.guarded(config, SyncState::Pushing, |this, session| {
            let mut report = this.pull_phase(session)?;
            this.push_phase(session, &mut report)?;
            Ok(report)
        })
    }

    /// Bring remote changes into the working directory without publishing.
    pub fn pull(&self) -> Result<SyncOutcome> {
        let config = self.config.load()?;
        self.guarded(config, SyncState::Pulling, |this, session| this.pull_phase(session))
    }

    /// Busy flag, session, lock, state bookkeeping and error reporting
    /// around `body`.
    fn guarded<F>(&self, config: SyncConfig, state: SyncState, body: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&Self, &Session) -> Result<SyncReport>,
    {
        let Some(_busy) = self.begin() else {
            return self.skip(SkipReason::InProgress);
        };

        let result = config.validate().and_then(|()| {
            let Some(_lock) = self.lock(&config)? else {
                return Ok(None);
            };
            let session = self.session(config)?;
            let seeded = if session.cloned {
                Some(session.copier.copy_repo_to_local(None)?)
            } else {
                None
            };
            self.set_state(state);
            let mut report = body(self, &session)?;
            if let Some(stats) = seeded {
                report.inbound.merge(stats);
            }
            Ok(Some(report))
        });

        match result {
            Ok(None) => self.skip(SkipReason::LockHeld),
            Ok(Some(report)) => {
                {
                    let mut cell = self.cell();
                    cell.last_sync = Some(Utc::now());
                    cell.last_error = None;
                    cell.last_pull = Some(report.inbound);
                }
                self.set_state(SyncState::Synced);
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                self.cell().last_error = Some(e.to_string());
                self.set_state(SyncState::Error);
                self.events.log(format!("Sync failed: {e}"), Severity::Error);
                Err(e)
            }
        }
    }

    /// Record local edits, integrate the remote and copy its changes into
    /// the working directory.
    ///
    /// Local edits are committed before pulling so that an overlapping
    /// remote change surfaces as divergence and Smart Merge sees both sides.
    fn pull_phase(&self, session: &Session) -> Result<SyncReport> {
        let Session {
            config, repo, copier, ..
        } = session;

        let outbound = copier.copy_local_to_repo()?;
        repo.commit_all(&self.commit_message(config))?;

        let baseline = copier.snapshot_mirror()?;
        let before = repo.head_id()?;

        let merge = match repo.pull() {
            Ok(PullOutcome::NoRemoteBranch) => {
                debug!("Remote branch does not exist yet");
                None
            }
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Pulled linearly");
                None
            }
            Err(e) if e.needs_smart_merge() => {
                warn!(error = %e, "Linear pull impossible; running Smart Merge");
                self.events.log("Histories diverged; running Smart Merge", Severity::Warning);
                Some(ConflictResolver::new(repo, &config.policy, config.device_name.clone()).run()?)
            }
            Err(e) => return Err(e.into()),
        };

        let changed = match (before, repo.head_id()?) {
            (before, Some(after)) if before != Some(after) => self.mirror_paths(config, repo.diff_paths(before, after)?),
            _ => BTreeSet::new(),
        };
        let inbound = copier.copy_repo_to_local(Some(&InboundScope { changed, baseline }))?;
        self.events.emit(SyncEvent::PullCompleted(inbound));

        let artifacts = merge.as_ref().map_or(0, |m| m.artifacts.len());
        if artifacts > 0 {
            self.events.log(
                format!("Smart Merge kept {artifacts} conflicting version(s) for review"),
                Severity::Warning,
            );
        }

        Ok(SyncReport {
            outbound,
            inbound,
            pushed: merge.as_ref().and_then(|m| m.commit).map(|c| c.to_string()),
            merge,
        })
    }

    /// Commit whatever changed during the pull and publish. A push lost to
    /// another replica gets one more pull-then-push.
    fn push_phase(&self, session: &Session, report: &mut SyncReport) -> Result<()> {
        let Session {
            config, repo, copier, ..
        } = session;

        let late = copier.copy_local_to_repo()?;
        report.outbound.copied += late.copied;
        repo.commit_all(&self.commit_message(config))?;

        if repo.status()?.ahead == 0 {
            debug!("Nothing to push");
            return Ok(());
        }

        #[cfg(test)]
        self.fire_before_push();
        match repo.push() {
            Ok(()) => {}
            Err(agsync_git::Error::PushRejected { message }) => {
                warn!(reason = %message, "Push rejected; pulling and retrying once");
                let retry = self.pull_phase(session)?;
                report.inbound.merge(retry.inbound);
                if retry.merge.is_some() {
                    report.merge = retry.merge;
                }
                #[cfg(test)]
                self.fire_before_push();
                repo.push().map_err(|e| match e {
                    agsync_git::Error::PushRejected { message } => Error::MergeFailure { message },
                    other => other.into(),
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(head) = repo.head_id()? {
            let commit = head.to_string();
            info!(commit = %commit, "Published");
            self.events.emit(SyncEvent::Pushed { commit: commit.clone() });
            report.pushed = Some(commit);
        }
        Ok(())
    }

    fn commit_message(&self, config: &SyncConfig) -> String {
        format!(
            "Sync from {} at {}",
            config.device_name,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Repository-relative paths under the data root, made mirror-relative.
    fn mirror_paths(&self, config: &SyncConfig, paths: Vec<NormalizedPath>) -> BTreeSet<NormalizedPath> {
        paths
            .iter()
            .filter_map(|p| p.strip_dir(&config.repository_subdir))
            .collect()
    }

    // ----- password -----

    /// Re-verify access with `token`, replace the shared password hash in
    /// the repository and publish it.
    pub fn reset_password(&self, new_password: &str, token: &str) -> Result<SyncOutcome<()>> {
        if new_password.is_empty() {
            return Err(Error::config("the new password is empty"));
        }
        let mut config = self.config.load()?;
        let url = config.require_url()?.to_string();

        let Some(_busy) = self.begin() else {
            return self.skip(SkipReason::InProgress);
        };
        agsync_git::verify_access(&url, Some(token))?;
        let Some(_lock) = self.lock(&config)? else {
            return self.skip(SkipReason::LockHeld);
        };
        let repo = VcsRepo::open(&config.repository_path, &url, Some(token.to_string()))?
            .with_author(config.device_name.clone());

        match repo.pull() {
            Ok(_) => {}
            Err(e) if e.needs_smart_merge() => {
                ConflictResolver::new(&repo, &config.policy, config.device_name.clone()).run()?;
            }
            Err(e) => return Err(e.into()),
        }

        PasswordRecord::new(&config.metadata_dir()).write(new_password)?;
        repo.commit_all(&format!("Reset sync password from {}", config.device_name))?;
        repo.push()?;

        self.credentials.set(&token_key(&url), token)?;
        self.credentials.set(&password_key(&url), new_password)?;
        config.sync_password_enabled = true;
        self.config.save(&config)?;

        info!("Sync password reset");
        self.events.log("Sync password changed", Severity::Info);
        Ok(SyncOutcome::Completed(()))
    }

    // ----- status -----

    /// Counts only. Reads local state and the last fetched remote position;
    /// never touches the network or the repository.
    pub fn get_status(&self) -> Result<SyncStatus> {
        Ok(self.collect_status()?.0)
    }

    pub fn get_detailed_status(&self) -> Result<DetailedStatus> {
        let (status, pending, config) = self.collect_status()?;
        let mut conflict_artifacts = 0;
        let mut recent_commits = Vec::new();
        if let Some(url) = config.repository_url.as_deref() {
            if let Ok(repo) = VcsRepo::inspect(&config.repository_path, url) {
                conflict_artifacts = ConflictArea::new(&config.repository_path).list()?.len();
                recent_commits = repo.recent_commits(5)?.into_iter().map(CommitEntry::from).collect();
            }
        }
        Ok(DetailedStatus {
            status,
            preview: pending.into_iter().take(PREVIEW_LIMIT).collect(),
            conflict_artifacts,
            last_pull: self.cell().last_pull,
            recent_commits,
        })
    }

    fn collect_status(&self) -> Result<(SyncStatus, Vec<String>, SyncConfig)> {
        let config = self.config.load()?;
        let (last_sync, last_error, state) = {
            let cell = self.cell();
            (cell.last_sync, cell.last_error.clone(), cell.state)
        };
        let mut status = SyncStatus {
            configured: config.repository_url.is_some(),
            state,
            pending_changes: 0,
            ahead: 0,
            behind: 0,
            last_sync,
            last_error,
            next_sync_in: self.schedule.countdown(),
        };

        let Some(url) = config.repository_url.as_deref() else {
            return Ok((status, Vec::new(), config));
        };
        let repo = match VcsRepo::inspect(&config.repository_path, url) {
            Ok(repo) => repo,
            Err(agsync_git::Error::NotARepository { .. }) => return Ok((status, Vec::new(), config)),
            Err(e) => return Err(e.into()),
        };

        let repo_status = repo.status()?;
        let mut pending: BTreeSet<String> = repo_status.uncommitted.into_iter().collect();
        for rel in self.copier(&config)?.pending_outbound()? {
            pending.insert(format!("{}/{}", config.repository_subdir, rel));
        }

        status.pending_changes = pending.len();
        status.ahead = repo_status.ahead;
        status.behind = repo_status.behind;
        Ok((status, pending.into_iter().collect(), config))
    }

    // ----- automatic sync -----

    /// Register a sink for countdown samples (about once a second while
    /// auto-sync runs).
    pub fn set_countdown_callback<F>(&self, callback: F)
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        let callback: CountdownCallback = Arc::new(callback);
        self.schedule.set_callback(Some(callback));
    }

    /// Start the interval timer and the debounced watcher on the current
    /// tokio runtime. Returns `false` when auto-sync is switched off.
    pub fn start_auto_sync(self: &Arc<Self>) -> Result<bool> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| Error::config("automatic sync needs a running tokio runtime"))?;

        self.stop_auto_sync();
        let config = self.config.load()?;
        if !config.enabled || !config.auto_sync {
            debug!("Automatic sync disabled in configuration");
            return Ok(false);
        }
        config.require_url()?;
        std::fs::create_dir_all(&config.local_path)?;

        let ticker = Arc::clone(self);
        let scheduler = Scheduler::start(
            Arc::clone(&self.schedule),
            self.events.clone(),
            config.sync_interval(),
            move || {
                let this = Arc::clone(&ticker);
                async move {
                    match tokio::task::spawn_blocking(move || this.sync()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_transient() => warn!(error = %e, "Scheduled sync failed; retrying next tick"),
                        Ok(Err(e)) => error!(error = %e, "Scheduled sync failed"),
                        Err(e) => error!(error = %e, "Scheduled sync panicked"),
                    }
                }
            },
        );

        let pusher = Arc::clone(self);
        let filter = FilterEngine::for_root(&config.local_path, &config.exclude_patterns)?;
        let watcher = DebouncedWatcher::start(
            &config.local_path,
            &config.folders,
            filter,
            Some(config.repository_path.clone()),
            config.debounce(),
            move |batch: BTreeSet<NormalizedPath>| {
                let this = Arc::clone(&pusher);
                async move {
                    debug!(files = batch.len(), "Pushing debounced changes");
                    match tokio::task::spawn_blocking(move || this.push()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "Debounced push failed"),
                        Err(e) => error!(error = %e, "Debounced push panicked"),
                    }
                }
            },
        )?;

        let mut auto = self.auto.lock().unwrap_or_else(|p| p.into_inner());
        auto.scheduler = Some(scheduler);
        auto.watcher = Some(watcher);
        info!(
            interval_minutes = config.sync_interval_minutes,
            debounce_seconds = config.debounce_seconds,
            "Automatic sync started"
        );
        Ok(true)
    }

    /// Stop future scheduled and watcher-triggered runs. A run already in
    /// flight completes.
    pub fn stop_auto_sync(&self) {
        let mut auto = self.auto.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(scheduler) = auto.scheduler.take() {
            scheduler.stop();
            info!("Automatic sync stopped");
        }
        auto.watcher = None;
        self.schedule.clear();
    }

    pub fn is_auto_syncing(&self) -> bool {
        self.auto
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .scheduler
            .is_some()
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.stop_auto_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;
    use crate::credentials::MemoryCredentialStore;
    use agsync_test_utils::{BareRemote, Replica};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    const SEED: &str = ".antigravity-sync/brain/seed.md";

    fn engine(remote: &BareRemote, replica: &Replica) -> SyncOrchestrator {
        let mut config = SyncConfig::with_paths(replica.local_root(), replica.repo_root());
        config.device_name = "laptop".to_string();
        config.auto_sync = false;
        config.repository_url = Some(remote.url());
        let credentials = MemoryCredentialStore::new();
        credentials.set(&token_key(&remote.url()), "t0k").unwrap();
        SyncOrchestrator::new(
            Arc::new(MemoryConfigProvider::new(config)),
            Arc::new(credentials),
            EventBus::default(),
        )
    }

    fn descends_from(remote: &BareRemote, commit: git2::Oid) -> bool {
        let bare = git2::Repository::open(remote.path()).unwrap();
        let head = remote.head().unwrap();
        head == commit || bare.graph_descendant_of(head, commit).unwrap()
    }

    #[test]
    fn rejected_push_pulls_and_publishes_once_more() {
        let remote = Arc::new(BareRemote::with_files(&[(SEED, "seed")]));
        let replica = Replica::new();
        let engine = engine(&remote, &replica);
        replica.write_local("brain/a.md", "from the laptop");

        let pushes = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(Mutex::new(None));
        {
            let (remote, pushes, late) = (remote.clone(), pushes.clone(), late.clone());
            *engine.before_push.lock().unwrap() = Some(Box::new(move || {
                if pushes.fetch_add(1, Ordering::SeqCst) == 0 {
                    let oid = remote.commit_files(&[(".antigravity-sync/brain/late.md", "raced")], "race", None);
                    *late.lock().unwrap() = Some(oid);
                }
            }));
        }

        let report = engine.sync().unwrap().completed().unwrap();

        assert_eq!(pushes.load(Ordering::SeqCst), 2);
        assert!(report.pushed.is_some());
        assert!(descends_from(&remote, late.lock().unwrap().unwrap()));
        assert_eq!(remote.read(".antigravity-sync/brain/a.md").as_deref(), Some("from the laptop"));
        assert_eq!(replica.read_local("brain/late.md").as_deref(), Some("raced"));
        assert_eq!(engine.state(), SyncState::Synced);
    }

    #[test]
    fn second_rejection_is_a_merge_failure() {
        let remote = Arc::new(BareRemote::with_files(&[(SEED, "seed")]));
        let replica = Replica::new();
        let engine = engine(&remote, &replica);
        replica.write_local("brain/a.md", "from the laptop");

        let pushes = Arc::new(AtomicUsize::new(0));
        {
            let (remote, pushes) = (remote.clone(), pushes.clone());
            *engine.before_push.lock().unwrap() = Some(Box::new(move || {
                let n = pushes.fetch_add(1, Ordering::SeqCst);
                let path = format!(".antigravity-sync/brain/race-{n}.md");
                remote.commit_files(&[(path.as_str(), "raced")], "race", None);
            }));
        }
        let before = remote.head().unwrap();

        let err = engine.sync().unwrap_err();

        assert!(matches!(err, Error::MergeFailure { .. }), "got {err:?}");
        assert_eq!(pushes.load(Ordering::SeqCst), 2);
        assert!(descends_from(&remote, before));
        assert_eq!(remote.read(".antigravity-sync/brain/a.md"), None);
        assert_eq!(engine.state(), SyncState::Error);
    }
}
