//! Change-aware copying between the working directory and the repository
//!
//! Outbound (working directory -> repository mirror) trusts size+mtime: a
//! destination with the same stamp is skipped. Inbound (mirror -> working
//! directory) never overwrites a strictly newer local file; the remote copy
//! goes to the conflict area instead.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::checksum::files_equal;
use crate::conflict::{self, ConflictArea, conflict_artifact_name, remote_artifact_name};
use crate::filter::is_valid_folder_name;
use crate::{Error, FileRecord, FilterEngine, NormalizedPath, Result, io};

/// Tunables for copy decisions.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Two mtimes closer than this are considered equal
    pub mtime_tolerance_ms: i64,
    /// Tag written into artifacts of overwritten local edits
    pub device_tag: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            mtime_tolerance_ms: 1000,
            device_tag: "local".to_string(),
        }
    }
}

/// Outcome of an outbound copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushStats {
    pub copied: usize,
    pub skipped: usize,
}

/// Outcome of an inbound copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStats {
    /// Files written into the working directory
    pub copied: usize,
    /// Files left alone because the local version was newer
    pub skipped_local_newer: usize,
    /// Conflict artifacts written
    pub conflicts_created: usize,
    /// Artifact files found in the mirror and never copied back
    pub conflicts_skipped: usize,
    /// Local files removed because the remote deleted them
    pub deleted: usize,
}

impl PullStats {
    pub fn merge(&mut self, other: PullStats) {
        self.copied += other.copied;
        self.skipped_local_newer += other.skipped_local_newer;
        self.conflicts_created += other.conflicts_created;
        self.conflicts_skipped += other.conflicts_skipped;
        self.deleted += other.deleted;
    }
}

/// Which mirror paths a pull touched, plus the mirror as it was before.
///
/// Paths are relative to the mirror root (`<folder>/...`).
#[derive(Debug, Clone, Default)]
pub struct InboundScope {
    pub changed: BTreeSet<NormalizedPath>,
    pub baseline: BTreeMap<NormalizedPath, FileRecord>,
}

/// Moves files between the working directory and the repository mirror.
#[derive(Debug, Clone)]
pub struct ChangeCopyEngine {
    local_root: PathBuf,
    mirror_root: PathBuf,
    folders: Vec<String>,
    filter: FilterEngine,
    conflicts: ConflictArea,
    options: CopyOptions,
}

impl ChangeCopyEngine {
    pub fn new(
        local_root: impl Into<PathBuf>,
        mirror_root: impl Into<PathBuf>,
        folders: Vec<String>,
        filter: FilterEngine,
        conflicts: ConflictArea,
        options: CopyOptions,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            mirror_root: mirror_root.into(),
            folders,
            filter,
            conflicts,
            options,
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn mirror_root(&self) -> &Path {
        &self.mirror_root
    }

    /// Local files whose mirror copy is missing or has a different stamp.
    pub fn pending_outbound(&self) -> Result<Vec<NormalizedPath>> {
        let mut pending = Vec::new();
        for rel in self.filter.files_to_sync(&self.local_root, &self.folders)? {
            if self.outbound_needs_copy(&rel)? {
                pending.push(rel);
            }
        }
        Ok(pending)
    }

    fn outbound_needs_copy(&self, rel: &NormalizedPath) -> Result<bool> {
        let Some(src) = FileRecord::read(rel.clone(), &rel.under(&self.local_root))? else {
            return Ok(false);
        };
        let dst = FileRecord::read(rel.clone(), &rel.under(&self.mirror_root))?;
        Ok(!dst.is_some_and(|dst| dst.same_stamp(&src)))
    }

    /// Copy every eligible local file into the mirror unless the mirror
    /// already has the same size and mtime.
    pub fn copy_local_to_repo(&self) -> Result<PushStats> {
        let mut stats = PushStats::default();
        for rel in self.filter.files_to_sync(&self.local_root, &self.folders)? {
            if self.outbound_needs_copy(&rel)? {
                io::copy_preserving_times(&rel.under(&self.local_root), &rel.under(&self.mirror_root))?;
                debug!(path = %rel, "Copied to repository");
                stats.copied += 1;
            } else {
                stats.skipped += 1;
            }
        }
        info!(copied = stats.copied, skipped = stats.skipped, "Local -> repository copy finished");
        Ok(stats)
    }

    /// Size+mtime records of every mirror file, used as the pre-pull
    /// baseline for [`InboundScope`].
    pub fn snapshot_mirror(&self) -> Result<BTreeMap<NormalizedPath, FileRecord>> {
        let mut out = BTreeMap::new();
        for rel in self.filter.files_to_sync(&self.mirror_root, &self.folders)? {
            if let Some(record) = FileRecord::read(rel.clone(), &rel.under(&self.mirror_root))? {
                out.insert(rel, record);
            }
        }
        Ok(out)
    }

    /// Bring mirror content into the working directory.
    ///
    /// With a scope only the paths a pull changed are considered, and mirror
    /// deletions are propagated to unmodified local files. Without a scope
    /// every mirror file is reconciled.
    pub fn copy_repo_to_local(&self, scope: Option<&InboundScope>) -> Result<PullStats> {
        let mut stats = PullStats::default();

        match scope {
            Some(scope) => {
                for rel in &scope.changed {
                    if !self.in_managed_folder(rel) {
                        continue;
                    }
                    if rel.file_name().is_some_and(conflict::is_conflict_artifact) {
                        stats.conflicts_skipped += 1;
                        continue;
                    }
                    if self.filter.is_excluded(rel) {
                        continue;
                    }
                    if rel.under(&self.mirror_root).is_file() {
                        self.reconcile_inbound(rel, scope.baseline.get(rel), &mut stats)?;
                    } else {
                        self.propagate_deletion(rel, scope.baseline.get(rel), &mut stats)?;
                    }
                }
            }
            None => {
                for rel in self.walk_mirror(&mut stats)? {
                    self.reconcile_inbound(&rel, None, &mut stats)?;
                }
            }
        }

        info!(
            copied = stats.copied,
            skipped_local_newer = stats.skipped_local_newer,
            conflicts_created = stats.conflicts_created,
            conflicts_skipped = stats.conflicts_skipped,
            deleted = stats.deleted,
            "Repository -> local copy finished"
        );
        Ok(stats)
    }

    fn in_managed_folder(&self, rel: &NormalizedPath) -> bool {
        self.folders.iter().any(|f| f == rel.top_level())
    }

    /// Mirror files eligible for inbound copy; artifacts are counted, not
    /// returned.
    fn walk_mirror(&self, stats: &mut PullStats) -> Result<Vec<NormalizedPath>> {
        let mut files = Vec::new();
        for folder in self.folders.iter().filter(|f| is_valid_folder_name(f)) {
            let folder_root = self.mirror_root.join(folder);
            if !folder_root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&folder_root).follow_links(false) {
                let entry = entry.map_err(|source| Error::Walk {
                    path: folder_root.clone(),
                    source,
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(rel) = NormalizedPath::relative(&self.mirror_root, entry.path()) else {
                    continue;
                };
                if rel.file_name().is_some_and(conflict::is_conflict_artifact) {
                    stats.conflicts_skipped += 1;
                } else if self.filter.is_included(&rel) {
                    files.push(rel);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn reconcile_inbound(
        &self,
        rel: &NormalizedPath,
        baseline: Option<&FileRecord>,
        stats: &mut PullStats,
    ) -> Result<()> {
        let tolerance = self.options.mtime_tolerance_ms;
        let remote_path = rel.under(&self.mirror_root);
        let local_path = rel.under(&self.local_root);

        let Some(remote) = FileRecord::read(rel.clone(), &remote_path)? else {
            return Ok(());
        };
        let Some(local) = FileRecord::read(rel.clone(), &local_path)? else {
            io::copy_preserving_times(&remote_path, &local_path)?;
            debug!(path = %rel, "New file from repository");
            stats.copied += 1;
            return Ok(());
        };

        if local.near_stamp(&remote, tolerance)
            || (local.size == remote.size && files_equal(&local_path, &remote_path)?)
        {
            return Ok(());
        }

        if local.newer_than(&remote, tolerance) {
            let name = remote_artifact_name(rel, Local::now());
            self.conflicts.preserve_file(rel, &name, &remote_path)?;
            debug!(path = %rel, "Local newer; kept local, preserved remote");
            stats.skipped_local_newer += 1;
            stats.conflicts_created += 1;
            return Ok(());
        }

        // An unmodified local file is just stale. Anything else is an edit
        // that would be lost by the overwrite.
        let pristine = baseline.is_some_and(|b| local.near_stamp(b, tolerance));
        if !pristine && !files_equal(&local_path, &remote_path)? {
            let name = conflict_artifact_name(rel, &self.options.device_tag, Local::now());
            self.conflicts.preserve_file(rel, &name, &local_path)?;
            stats.conflicts_created += 1;
        }

        io::copy_preserving_times(&remote_path, &local_path)?;
        debug!(path = %rel, "Updated from repository");
        stats.copied += 1;
        Ok(())
    }

    fn propagate_deletion(
        &self,
        rel: &NormalizedPath,
        baseline: Option<&FileRecord>,
        stats: &mut PullStats,
    ) -> Result<()> {
        let local_path = rel.under(&self.local_root);
        let Some(local) = FileRecord::read(rel.clone(), &local_path)? else {
            return Ok(());
        };
        match baseline {
            Some(base) if local.near_stamp(base, self.options.mtime_tolerance_ms) => {
                io::remove_if_exists(&local_path)?;
                debug!(path = %rel, "Removed locally after remote deletion");
                stats.deleted += 1;
            }
            _ => {
                warn!(path = %rel, "Remote deleted a locally modified file; keeping local copy");
            }
        }
        Ok(())
    }
}
