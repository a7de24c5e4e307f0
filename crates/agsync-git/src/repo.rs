//! The on-disk versioned working copy

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use agsync_fs::{NormalizedPath, SyncPath, io};
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, ErrorCode, IndexAddOption, Oid, RebaseOptions, Repository, RepositoryInitOptions,
    ResetType, Signature, StashFlags, StatusOptions,
};
use tracing::{debug, info, warn};

use crate::auth::{self, RemoteInfo, redact_url, strip_credentials};
use crate::history::{self, CommitInfo};
use crate::tree::{self, BlobInfo};
use crate::{Error, Result};

/// Remote alias the engine manages.
pub const REMOTE_NAME: &str = "origin";

const STASH_MESSAGE: &str = "agsync: auto-stash before pull";

const DEFAULT_AUTHOR: &str = "Antigravity Sync";
const AUTHOR_EMAIL: &str = "agsync@localhost";

/// Lines the engine keeps in the repository's `.gitignore`.
const GITIGNORE_LINES: &[&str] = &[".sync.lock", ".sync-conflicts/"];

static GIT_GATE: Mutex<()> = Mutex::new(());

/// Serialises every git operation in the process.
fn gate() -> MutexGuard<'static, ()> {
    GIT_GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What a pull did to the local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote has no commits on the tracked branch yet
    NoRemoteBranch,
    UpToDate,
    /// Local history was behind and moved forward
    FastForwarded { from: Oid, to: Oid },
    /// Local commits were replayed on top of the remote tip
    Rebased { from: Oid, to: Oid },
}

impl PullOutcome {
    /// The `(old, new)` HEAD pair if the working tree changed.
    pub fn moved(&self) -> Option<(Oid, Oid)> {
        match self {
            Self::FastForwarded { from, to } | Self::Rebased { from, to } => Some((*from, *to)),
            _ => None,
        }
    }
}

/// Working-tree and branch position summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    /// Uncommitted paths (untracked included, ignored excluded)
    pub uncommitted: Vec<String>,
    pub ahead: usize,
    pub behind: usize,
}

/// A git working copy plus the credentials for its remote.
///
/// The token lives only in memory and is attached per network call.
#[derive(Debug, Clone)]
pub struct VcsRepo {
    root: PathBuf,
    url: String,
    token: Option<String>,
    author: String,
}

impl VcsRepo {
    /// Open an existing working copy and point its remote at `url`.
    pub fn open(root: &Path, url: &str, token: Option<String>) -> Result<Self> {
        if !root.join(SyncPath::GitDir).exists() {
            return Err(Error::NotARepository {
                path: root.to_path_buf(),
            });
        }
        let vcs = Self {
            root: root.to_path_buf(),
            url: strip_credentials(url),
            token,
            author: DEFAULT_AUTHOR.to_string(),
        };
        let _g = gate();
        let repo = vcs.repo()?;
        vcs.configure_remote(&repo)?;
        ensure_gitignore(&vcs.root)?;
        Ok(vcs)
    }

    /// Handle for read-only queries. Touches neither the remote
    /// configuration nor `.gitignore`, and carries no token.
    pub fn inspect(root: &Path, url: &str) -> Result<Self> {
        if !root.join(SyncPath::GitDir).exists() {
            return Err(Error::NotARepository {
                path: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            url: strip_credentials(url),
            token: None,
            author: DEFAULT_AUTHOR.to_string(),
        })
    }

    /// Open the working copy at `root`, cloning or initialising it first
    /// when absent. Returns the repo and whether it was freshly cloned.
    pub fn ensure(root: &Path, url: &str, token: Option<String>, branch: &str) -> Result<(Self, bool)> {
        if root.join(SyncPath::GitDir).exists() {
            return Ok((Self::open(root, url, token)?, false));
        }

        let url = strip_credentials(url);
        let info = auth::verify_access(&url, token.as_deref())?;
        fs::create_dir_all(root).map_err(|e| agsync_fs::Error::io(root, e))?;

        let _g = gate();
        let cloned = if info.is_empty {
            init_empty(root, &url, branch)?;
            false
        } else {
            clone_into(root, &url, token.as_deref(), &info, branch)?;
            true
        };
        ensure_gitignore(root)?;

        Ok((
            Self {
                root: root.to_path_buf(),
                url,
                token,
                author: DEFAULT_AUTHOR.to_string(),
            },
            cloned,
        ))
    }

    /// Use `name` for the commit author when git config has none.
    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn repo(&self) -> Result<Repository> {
        Ok(Repository::open(&self.root)?)
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>> {
        match repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now(&self.author, AUTHOR_EMAIL)?),
        }
    }

    /// Keep `origin` pointed at the configured URL, credential-free.
    fn configure_remote(&self, repo: &Repository) -> Result<()> {
        match repo.find_remote(REMOTE_NAME) {
            Ok(remote) => {
                if remote.url() != Some(self.url.as_str()) {
                    repo.remote_set_url(REMOTE_NAME, &self.url)?;
                    info!(url = %redact_url(&self.url), "Updated remote URL");
                }
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                repo.remote(REMOTE_NAME, &self.url)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Current branch name, `main` on an unborn HEAD.
    pub fn current_branch(&self) -> Result<String> {
        let _g = gate();
        current_branch(&self.repo()?)
    }

    pub fn head_id(&self) -> Result<Option<Oid>> {
        let _g = gate();
        head_id(&self.repo()?)
    }

    /// Tip of the remote-tracking branch as of the last fetch.
    pub fn remote_tip(&self) -> Result<Option<Oid>> {
        let _g = gate();
        let repo = self.repo()?;
        remote_tip(&repo, &current_branch(&repo)?)
    }

    /// Fetch the tracked branch into `refs/remotes/origin/<branch>`.
    pub fn fetch(&self) -> Result<Option<Oid>> {
        let _g = gate();
        let repo = self.repo()?;
        self.fetch_locked(&repo)
    }

    fn fetch_locked(&self, repo: &Repository) -> Result<Option<Oid>> {
        let branch = current_branch(repo)?;
        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| Error::RemoteNotConfigured {
                name: REMOTE_NAME.to_string(),
            })?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{REMOTE_NAME}/{branch}");
        let mut fo = auth::fetch_options(self.token.as_deref());
        remote
            .fetch(&[&refspec], Some(&mut fo), None)
            .map_err(|e| Error::from_remote(e, &self.url))?;
        let tip = remote_tip(repo, &branch)?;
        debug!(branch = %branch, tip = ?tip, "Fetched");
        Ok(tip)
    }

    /// Fetch and move the local branch onto the remote tip without a merge
    /// commit, setting uncommitted changes aside for the duration.
    ///
    /// Returns [`Error::Diverged`] when local commits cannot be replayed
    /// cleanly.
    pub fn pull(&self) -> Result<PullOutcome> {
        let _g = gate();
        let mut repo = self.repo()?;
        let Some(remote) = self.fetch_locked(&repo)? else {
            return Ok(PullOutcome::NoRemoteBranch);
        };

        let stashed = self.stash_save(&mut repo)?;
        let outcome = self.integrate(&repo, remote);
        let restored = if stashed { self.stash_pop(&mut repo) } else { Ok(()) };

        let outcome = outcome?;
        restored?;
        info!(outcome = ?outcome, "Pulled");
        Ok(outcome)
    }

    fn integrate(&self, repo: &Repository, remote: Oid) -> Result<PullOutcome> {
        let Some(head) = head_id(repo)? else {
            // Unborn branch: adopt the remote history wholesale
            let branch = current_branch(repo)?;
            repo.reference(&format!("refs/heads/{branch}"), remote, true, "pull: adopt remote")?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(PullOutcome::FastForwarded { from: remote, to: remote });
        };

        let annotated = repo.find_annotated_commit(remote)?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{}", current_branch(repo)?);
            let mut reference = repo.find_reference(&refname)?;
            reference.set_target(remote, &format!("pull: fast-forward to {remote}"))?;
            repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
            return Ok(PullOutcome::FastForwarded { from: head, to: remote });
        }

        self.rebase_onto(repo, head, remote)
    }

    fn rebase_onto(&self, repo: &Repository, head: Oid, remote: Oid) -> Result<PullOutcome> {
        let sig = self.signature(repo)?;
        let local = repo.reference_to_annotated_commit(&repo.head()?)?;
        let upstream = repo.find_annotated_commit(remote)?;
        let mut opts = RebaseOptions::new();
        let mut rebase = repo.rebase(Some(&local), Some(&upstream), None, Some(&mut opts))?;

        while let Some(op) = rebase.next() {
            if let Err(e) = op {
                rebase.abort()?;
                return Err(Error::Diverged {
                    message: e.message().to_string(),
                });
            }
            if repo.index()?.has_conflicts() {
                rebase.abort()?;
                return Err(Error::Diverged {
                    message: format!("replaying local commits onto {remote} conflicts"),
                });
            }
            match rebase.commit(None, &sig, None) {
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::Applied => {}
                Err(e) => {
                    rebase.abort()?;
                    return Err(Error::Diverged {
                        message: e.message().to_string(),
                    });
                }
            }
        }
        rebase.finish(Some(&sig))?;

        let to = head_id(repo)?.unwrap_or(remote);
        Ok(PullOutcome::Rebased { from: head, to })
    }

    fn stash_save(&self, repo: &mut Repository) -> Result<bool> {
        if is_clean(repo)? || head_id(repo)?.is_none() {
            return Ok(false);
        }
        let sig = self.signature(repo)?;
        match repo.stash_save(&sig, STASH_MESSAGE, Some(StashFlags::INCLUDE_UNTRACKED)) {
            Ok(_) => {
                debug!("Set aside local changes");
                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn stash_pop(&self, repo: &mut Repository) -> Result<()> {
        repo.stash_pop(0, None).map_err(|e| Error::MergeConflict {
            message: format!("restoring set-aside changes failed: {}", e.message()),
        })
    }

    /// Re-apply any auto-stash left behind by an interrupted pull.
    ///
    /// A stash that no longer applies stays in the stash list and is
    /// reported as [`Error::StashNotRestored`].
    pub fn restore_stash(&self) -> Result<bool> {
        let _g = gate();
        let mut repo = self.repo()?;
        let mut found = None;
        repo.stash_foreach(|index, message, _| {
            if message.contains(STASH_MESSAGE) {
                found = Some(index);
                false
            } else {
                true
            }
        })?;
        let Some(index) = found else {
            return Ok(false);
        };
        repo.stash_pop(index, None).map_err(|e| {
            warn!(error = %e, "Could not restore auto-stash; it remains in the stash list");
            Error::StashNotRestored {
                message: e.message().to_string(),
            }
        })?;
        Ok(true)
    }

    /// Stage everything and commit if the tree changed. `Ok(None)` when
    /// there was nothing to commit.
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>> {
        let _g = gate();
        let repo = self.repo()?;
        self.commit_locked(&repo, message, None)
    }

    /// Stage everything and record a commit with `other` as second parent.
    pub fn commit_merge(&self, message: &str, other: Oid) -> Result<Oid> {
        let _g = gate();
        let repo = self.repo()?;
        match self.commit_locked(&repo, message, Some(other))? {
            Some(oid) => Ok(oid),
            None => Err(Error::MergeConflict {
                message: "merge produced no commit".to_string(),
            }),
        }
    }

    fn commit_locked(&self, repo: &Repository, message: &str, other: Option<Oid>) -> Result<Option<Oid>> {
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let head = head_id(repo)?;
        let parent = head.map(|oid| repo.find_commit(oid)).transpose()?;
        let unchanged = parent
            .as_ref()
            .is_some_and(|p| p.tree_id() == tree_id);
        if unchanged && other.is_none() {
            debug!("Nothing to commit");
            return Ok(None);
        }

        let tree = repo.find_tree(tree_id)?;
        let sig = self.signature(repo)?;
        let mut parents = Vec::new();
        if let Some(p) = parent {
            parents.push(p);
        }
        if let Some(o) = other {
            parents.push(repo.find_commit(o)?);
        }
        let parent_refs: Vec<_> = parents.iter().collect();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
        info!(commit = %oid, message = %message, "Committed");
        Ok(Some(oid))
    }

    /// Push the current branch and link it to its upstream.
    pub fn push(&self) -> Result<()> {
        let _g = gate();
        let repo = self.repo()?;
        let branch = current_branch(&repo)?;
        if head_id(&repo)?.is_none() {
            return Ok(());
        }

        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| Error::RemoteNotConfigured {
                name: REMOTE_NAME.to_string(),
            })?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");

        let rejected: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = auth::callbacks(self.token.as_deref());
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                *rejected.borrow_mut() = Some(format!("{refname}: {msg}"));
            }
            Ok(())
        });
        let mut po = auth::push_options(callbacks);

        remote
            .push(&[&refspec], Some(&mut po))
            .map_err(|e| Error::from_remote(e, &self.url))?;
        drop(po);

        if let Some(message) = rejected.into_inner() {
            return Err(Error::PushRejected { message });
        }

        if let Ok(mut local) = repo.find_branch(&branch, BranchType::Local)
            && local.upstream().is_err()
            && let Err(e) = local.set_upstream(Some(&format!("{REMOTE_NAME}/{branch}")))
        {
            warn!(branch = %branch, error = %e, "Failed to set upstream");
        }
        info!(branch = %branch, "Pushed");
        Ok(())
    }

    /// Uncommitted paths and ahead/behind against the last fetched tip.
    pub fn status(&self) -> Result<RepoStatus> {
        let _g = gate();
        let repo = self.repo()?;
        let uncommitted = uncommitted_paths(&repo)?;
        let branch = current_branch(&repo)?;

        let (ahead, behind) = match (head_id(&repo)?, remote_tip(&repo, &branch)?) {
            (Some(local), Some(upstream)) => repo.graph_ahead_behind(local, upstream)?,
            (Some(local), None) => {
                let mut walk = repo.revwalk()?;
                walk.push(local)?;
                (walk.count(), 0)
            }
            _ => (0, 0),
        };

        Ok(RepoStatus {
            uncommitted,
            ahead,
            behind,
        })
    }

    pub fn is_clean(&self) -> Result<bool> {
        let _g = gate();
        is_clean(&self.repo()?)
    }

    /// Abort an in-progress rebase or merge, drop a stale index lock and
    /// clear conflict entries from the index. The working tree is kept.
    pub fn abort_in_progress(&self) -> Result<()> {
        let _g = gate();
        let index_lock = self.root.join(SyncPath::GitDir).join("index.lock");
        if io::remove_if_exists(&index_lock)? {
            warn!(path = %index_lock.display(), "Removed stale index lock");
        }

        let repo = self.repo()?;
        if let Ok(mut rebase) = repo.open_rebase(None) {
            warn!("Aborting interrupted rebase");
            rebase.abort()?;
        }
        repo.cleanup_state()?;

        let mut index = repo.index()?;
        if index.has_conflicts()
            && let Some(head) = head_id(&repo)?
        {
            index.read_tree(&repo.find_commit(head)?.tree()?)?;
            index.write()?;
        }
        Ok(())
    }

    /// `git reset --soft HEAD`: keep index and working tree, drop any
    /// half-finished ref movement.
    pub fn reset_soft_to_head(&self) -> Result<()> {
        let _g = gate();
        let repo = self.repo()?;
        if let Some(head) = head_id(&repo)? {
            let obj = repo.find_object(head, None)?;
            repo.reset(&obj, ResetType::Soft, None)?;
        }
        Ok(())
    }

    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Option<Oid>> {
        let _g = gate();
        match self.repo()?.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Repository-relative paths that differ between two commits.
    pub fn diff_paths(&self, from: Option<Oid>, to: Oid) -> Result<Vec<NormalizedPath>> {
        let _g = gate();
        tree::diff_paths(&self.repo()?, from, to)
    }

    pub fn blob_info(&self, commit: Oid, path: &NormalizedPath) -> Result<Option<BlobInfo>> {
        let _g = gate();
        tree::blob_info(&self.repo()?, commit, path)
    }

    pub fn read_blob(&self, commit: Oid, path: &NormalizedPath) -> Result<Option<Vec<u8>>> {
        let _g = gate();
        tree::read_blob(&self.repo()?, commit, path)
    }

    /// Last time (ms) history reachable from `tip` touched `path`.
    pub fn last_touch_ms(&self, tip: Oid, path: &NormalizedPath, depth: usize) -> Result<i64> {
        let _g = gate();
        history::last_touch_ms(&self.repo()?, tip, Path::new(path.as_str()), depth)
    }

    pub fn recent_commits(&self, max_count: usize) -> Result<Vec<CommitInfo>> {
        let _g = gate();
        let repo = self.repo()?;
        match head_id(&repo)? {
            Some(head) => history::list_recent_commits(&repo, head, max_count),
            None => Ok(Vec::new()),
        }
    }
}

fn head_id(repo: &Repository) -> Result<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn current_branch(repo: &Repository) -> Result<String> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().unwrap_or("main").to_string()),
        Ok(_) => Ok("HEAD".to_string()),
        Err(_) => {
            // Unborn: HEAD is a symbolic ref to the branch to be
            let target = repo
                .find_reference("HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(str::to_string));
            Ok(target
                .as_deref()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .unwrap_or("main")
                .to_string())
        }
    }
}

fn remote_tip(repo: &Repository, branch: &str) -> Result<Option<Oid>> {
    match repo.find_reference(&format!("refs/remotes/{REMOTE_NAME}/{branch}")) {
        Ok(r) => Ok(r.target()),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn uncommitted_paths(repo: &Repository) -> Result<Vec<String>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses
        .iter()
        .filter_map(|s| s.path().map(str::to_string))
        .collect())
}

fn is_clean(repo: &Repository) -> Result<bool> {
    Ok(uncommitted_paths(repo)?.is_empty())
}

fn init_empty(root: &Path, url: &str, branch: &str) -> Result<()> {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch);
    let repo = Repository::init_opts(root, &opts)?;
    repo.remote(REMOTE_NAME, url)?;

    let sig = match repo.signature() {
        Ok(sig) => sig.to_owned(),
        Err(_) => Signature::now(DEFAULT_AUTHOR, AUTHOR_EMAIL)?,
    };
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])?;
    info!(path = %root.display(), branch = %branch, "Initialised repository for empty remote");
    Ok(())
}

/// First checkout of a populated remote.
///
/// Built from init, fetch and checkout rather than a plain clone so that a
/// root already holding the sync lock marker is accepted. A failed attempt
/// removes its `.git` so the next run starts over.
fn clone_into(root: &Path, url: &str, token: Option<&str>, info: &RemoteInfo, branch: &str) -> Result<()> {
    let branch = info.default_branch.as_deref().unwrap_or(branch);
    let result = checkout_remote(root, url, token, branch);
    if result.is_err() {
        let git_dir = root.join(SyncPath::GitDir);
        if let Err(e) = fs::remove_dir_all(&git_dir) {
            warn!(path = %git_dir.display(), error = %e, "Failed to clean up partial checkout");
        }
    }
    result
}

fn checkout_remote(root: &Path, url: &str, token: Option<&str>, branch: &str) -> Result<()> {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch);
    let repo = Repository::init_opts(root, &opts)?;
    let mut remote = repo.remote(REMOTE_NAME, url)?;

    let refspec = format!("+refs/heads/{branch}:refs/remotes/{REMOTE_NAME}/{branch}");
    let mut fo = auth::fetch_options(token);
    remote
        .fetch(&[&refspec], Some(&mut fo), None)
        .map_err(|e| Error::from_remote(e, url))?;
    let tip = remote_tip(&repo, branch)?.ok_or_else(|| Error::RemoteNotFound {
        url: redact_url(url),
        message: format!("branch {branch} is not on the remote"),
    })?;

    let refname = format!("refs/heads/{branch}");
    repo.reference(&refname, tip, true, "checkout: initial")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
    repo.find_branch(branch, BranchType::Local)?
        .set_upstream(Some(&format!("{REMOTE_NAME}/{branch}")))?;

    info!(path = %root.display(), url = %redact_url(url), branch = %branch, "Checked out remote");
    Ok(())
}

/// Make sure engine-local files never get committed.
fn ensure_gitignore(root: &Path) -> Result<()> {
    let path = root.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(agsync_fs::Error::io(&path, e).into()),
    };
    let missing: Vec<&str> = GITIGNORE_LINES
        .iter()
        .copied()
        .filter(|line| !existing.lines().any(|l| l.trim() == *line))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for line in missing {
        content.push_str(line);
        content.push('\n');
    }
    io::write_atomic(&path, content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestorable_stash_is_reported_and_kept() {
        let remote = agsync_test_utils::BareRemote::with_files(&[("a.txt", "1")]);
        let replica = agsync_test_utils::Replica::new();
        let (vcs, _) = VcsRepo::ensure(&replica.repo_root(), &remote.url(), None, "main").unwrap();
        vcs.commit_all("gitignore").unwrap();

        let mut repo = Repository::open(vcs.root()).unwrap();
        fs::write(vcs.root().join("a.txt"), "set aside").unwrap();
        let sig = Signature::now("t", "t@example.com").unwrap();
        repo.stash_save(&sig, STASH_MESSAGE, None).unwrap();
        fs::write(vcs.root().join("a.txt"), "edited since").unwrap();

        let err = vcs.restore_stash().unwrap_err();

        assert!(matches!(err, Error::StashNotRestored { .. }), "got {err:?}");
        let mut stashes = 0;
        repo.stash_foreach(|_, _, _| {
            stashes += 1;
            true
        })
        .unwrap();
        assert_eq!(stashes, 1);
        assert_eq!(fs::read_to_string(vcs.root().join("a.txt")).unwrap(), "edited since");
    }

    #[test]
    fn gitignore_is_extended_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "node_modules/").unwrap();

        ensure_gitignore(dir.path()).unwrap();
        ensure_gitignore(dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "node_modules/\n.sync.lock\n.sync-conflicts/\n");
    }

    #[test]
    fn open_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = VcsRepo::open(dir.path(), "file:///nowhere", None).unwrap_err();
        assert!(matches!(err, Error::NotARepository { .. }));
    }
}
