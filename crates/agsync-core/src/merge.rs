//! Smart Merge: per-file winner selection when a linear pull is impossible
//!
//! Every path that differs between the local commit and the remote tip is
//! decided on its own. One-sided changes win outright. Paths changed on both
//! sides go through [`decide`]: for binary-like files a large size difference
//! favours the larger file, otherwise the more recent side wins. The losing
//! side is preserved in the conflict area whenever it carried content that
//! is not already in the shared history.
//!
//! The result is committed as a merge of HEAD and the remote tip and pushed.
//! A push lost to a concurrent replica triggers exactly one more round.

use std::path::PathBuf;

use agsync_fs::checksum::file_equals_bytes;
use agsync_fs::conflict::conflict_artifact_name;
use agsync_fs::{ConflictArea, FileRecord, NormalizedPath, SyncPath, io};
use agsync_git::{BlobInfo, VcsRepo};
use chrono::Local;
use git2::Oid;
use tracing::{debug, info, warn};

use crate::config::MergePolicy;
use crate::{Error, Result};

/// Device tag used for artifacts of the remote side.
const REMOTE_TAG: &str = "remote";

/// One side of a conflicting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSide {
    Present { size: u64, mtime_ms: i64 },
    /// Never existed on this side
    Missing,
    /// Removed by a commit at `at_ms`
    Deleted { at_ms: i64 },
}

impl FileSide {
    fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Pick the winner for a path both sides changed.
///
/// Pure: the same inputs always give the same answer. Ties go to the local
/// side.
pub fn decide(path: &NormalizedPath, local: &FileSide, remote: &FileSide, policy: &MergePolicy) -> Winner {
    let tolerance = policy.mtime_tolerance_ms;
    match (*local, *remote) {
        (FileSide::Present { .. }, FileSide::Missing) => Winner::Local,
        (FileSide::Present { mtime_ms, .. }, FileSide::Deleted { at_ms }) => {
            if at_ms - mtime_ms > tolerance {
                Winner::Remote
            } else {
                Winner::Local
            }
        }
        (_, FileSide::Present { .. }) if !local.is_present() => Winner::Remote,
        (
            FileSide::Present {
                size: local_size,
                mtime_ms: local_mtime,
            },
            FileSide::Present {
                size: remote_size,
                mtime_ms: remote_mtime,
            },
        ) => {
            if policy.is_binary(path) && size_ratio(local_size, remote_size) > policy.binary_size_ratio {
                return if remote_size > local_size {
                    Winner::Remote
                } else {
                    Winner::Local
                };
            }
            if remote_mtime - local_mtime > tolerance {
                Winner::Remote
            } else {
                Winner::Local
            }
        }
        _ => Winner::Local,
    }
}

/// `|a - b| / max(a, b)`, zero for two empty files.
pub fn size_ratio(a: u64, b: u64) -> f64 {
    let larger = a.max(b);
    if larger == 0 {
        return 0.0;
    }
    a.abs_diff(b) as f64 / larger as f64
}

/// Summary of one Smart Merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Paths that differed between HEAD and the remote tip
    pub examined: usize,
    /// Paths byte-identical on both sides
    pub identical: usize,
    pub kept_local: usize,
    pub took_remote: usize,
    /// Local files removed because the remote deletion won
    pub deleted: usize,
    /// Artifacts written for losing sides
    pub artifacts: Vec<PathBuf>,
    /// The merge commit, if one was made
    pub commit: Option<Oid>,
    /// Merge rounds needed (2 when the first push lost a race)
    pub attempts: usize,
}

/// Applies Smart Merge to one repository.
pub struct ConflictResolver<'a> {
    repo: &'a VcsRepo,
    policy: &'a MergePolicy,
    conflicts: ConflictArea,
    device: String,
    /// Runs right before each push; lets tests move the remote under us
    #[cfg(test)]
    before_push: Option<Box<dyn Fn() + 'a>>,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(repo: &'a VcsRepo, policy: &'a MergePolicy, device: impl Into<String>) -> Self {
        Self {
            repo,
            policy,
            conflicts: ConflictArea::new(repo.root()),
            device: device.into(),
            #[cfg(test)]
            before_push: None,
        }
    }

    /// Merge, commit and push, retrying once if the push loses a race.
    ///
    /// Never force-pushes. A second failure is [`Error::MergeFailure`].
    pub fn run(&self) -> Result<MergeReport> {
        match self.round() {
            Ok(mut report) => {
                report.attempts = 1;
                Ok(report)
            }
            Err(e) if Self::retryable(&e) => {
                warn!(error = %e, "Smart Merge round failed; retrying once");
                let mut report = self.round().map_err(|e| match e {
                    Error::Network { .. } | Error::Access { .. } | Error::NotFound { .. } => e,
                    other => Error::MergeFailure {
                        message: other.to_string(),
                    },
                })?;
                report.attempts = 2;
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    fn retryable(err: &Error) -> bool {
        !matches!(
            err,
            Error::Network { .. }
                | Error::Access { .. }
                | Error::NotFound { .. }
                | Error::Fs(_)
                | Error::MergeFailure { .. }
        )
    }

    fn round(&self) -> Result<MergeReport> {
        let report = self.merge_once()?;
        #[cfg(test)]
        if let Some(hook) = &self.before_push {
            hook();
        }
        self.repo.push()?;
        Ok(report)
    }

    /// Steps 1-7 plus the merge commit, without pushing.
    pub fn merge_once(&self) -> Result<MergeReport> {
        self.repo.abort_in_progress()?;
        self.repo.restore_stash()?;
        self.repo.reset_soft_to_head()?;

        let mut report = MergeReport::default();
        let Some(tip) = self.repo.fetch()? else {
            report.commit = self.repo.commit_all(&self.message(0))?;
            return Ok(report);
        };
        let head = self.repo.head_id()?;
        let base = match head {
            Some(h) => self.repo.merge_base(h, tip)?,
            None => None,
        };
        if base == Some(tip) {
            debug!("Remote tip already contained in local history");
            report.commit = self.repo.commit_all(&self.message(0))?;
            return Ok(report);
        }

        for path in self.repo.diff_paths(head, tip)? {
            if self.is_engine_local(&path) {
                continue;
            }
            report.examined += 1;
            self.resolve_path(&path, base, tip, &mut report)?;
        }

        let decided = report.kept_local + report.took_remote;
        let commit = self.repo.commit_merge(&self.message(decided), tip)?;
        info!(
            commit = %commit,
            examined = report.examined,
            kept_local = report.kept_local,
            took_remote = report.took_remote,
            artifacts = report.artifacts.len(),
            "Smart Merge committed"
        );
        report.commit = Some(commit);
        Ok(report)
    }

    fn message(&self, decided: usize) -> String {
        format!("Smart Merge: {decided} conflicting file(s) resolved on {}", self.device)
    }

    fn is_engine_local(&self, path: &NormalizedPath) -> bool {
        let top = path.top_level();
        top == SyncPath::ConflictsDir.as_str()
            || top == SyncPath::LockFile.as_str()
            || path.file_name().is_some_and(agsync_fs::is_conflict_artifact)
    }

    fn resolve_path(
        &self,
        path: &NormalizedPath,
        base: Option<Oid>,
        tip: Oid,
        report: &mut MergeReport,
    ) -> Result<()> {
        let full = path.under(self.repo.root());
        let local = FileRecord::read(path.clone(), &full)?;
        let remote_blob = self.repo.blob_info(tip, path)?;
        let base_blob = match base {
            Some(b) => self.repo.blob_info(b, path)?,
            None => None,
        };
        let remote_bytes = match remote_blob {
            Some(_) => self.repo.read_blob(tip, path)?,
            None => None,
        };

        let identical = match (&local, &remote_bytes) {
            (None, None) => true,
            (Some(_), Some(bytes)) => file_equals_bytes(&full, bytes)?,
            _ => false,
        };
        if identical {
            debug!(path = %path, "Identical on both sides");
            report.identical += 1;
            return Ok(());
        }

        let remote_changed = remote_blob.as_ref().map(|b| b.id) != base_blob.as_ref().map(|b| b.id);
        let local_changed = self.local_changed(path, local.is_some(), base, base_blob.as_ref())?;

        let winner = if !local_changed {
            Winner::Remote
        } else if !remote_changed {
            Winner::Local
        } else {
            let local_side = match &local {
                Some(r) => FileSide::Present {
                    size: r.size,
                    mtime_ms: r.mtime_ms,
                },
                None => FileSide::Missing,
            };
            let touched = self
                .repo
                .last_touch_ms(tip, path, self.policy.remote_history_depth)?;
            let remote_side = match &remote_blob {
                Some(info) => FileSide::Present {
                    size: info.size,
                    mtime_ms: touched,
                },
                None if base_blob.is_some() => FileSide::Deleted { at_ms: touched },
                None => FileSide::Missing,
            };
            decide(path, &local_side, &remote_side, self.policy)
        };

        let now = Local::now();
        match winner {
            Winner::Remote => {
                if local.is_some() && local_changed {
                    let name = conflict_artifact_name(path, &self.device, now);
                    report.artifacts.push(self.conflicts.preserve_file(path, &name, &full)?);
                }
                match &remote_bytes {
                    Some(bytes) => io::write_with_times(&full, bytes, None)?,
                    None => {
                        if io::remove_if_exists(&full)? {
                            report.deleted += 1;
                        }
                    }
                }
                debug!(path = %path, "Remote side wins");
                report.took_remote += 1;
            }
            Winner::Local => {
                if remote_changed && let Some(bytes) = &remote_bytes {
                    let name = conflict_artifact_name(path, REMOTE_TAG, now);
                    report.artifacts.push(self.conflicts.preserve_bytes(path, &name, bytes)?);
                }
                debug!(path = %path, "Local side wins");
                report.kept_local += 1;
            }
        }
        Ok(())
    }

    /// Whether the working-tree file differs from the common ancestor.
    fn local_changed(
        &self,
        path: &NormalizedPath,
        local_exists: bool,
        base: Option<Oid>,
        base_blob: Option<&BlobInfo>,
    ) -> Result<bool> {
        match (local_exists, base, base_blob) {
            (false, _, None) => Ok(false),
            (false, _, Some(_)) | (true, _, None) => Ok(true),
            (true, Some(base), Some(_)) => {
                let full = path.under(self.repo.root());
                match self.repo.read_blob(base, path)? {
                    Some(bytes) => Ok(!file_equals_bytes(&full, &bytes)?),
                    None => Ok(true),
                }
            }
            (true, None, Some(_)) => Ok(true),
        }
    }
}
