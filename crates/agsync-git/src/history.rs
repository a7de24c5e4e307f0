//! Commit history queries: recent commits and per-path last-touch times.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Commit, Oid, Repository, Sort};

use crate::Result;

/// Information about a single commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// Short commit hash (7 characters)
    pub hash: String,

    /// First line of the commit message
    pub message: String,

    /// Commit author name
    pub author: String,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    fn from_commit(commit: &Commit<'_>) -> Self {
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_default();
        let message = commit
            .message()
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .to_string();
        let author = commit.author().name().unwrap_or("Unknown").to_string();

        Self {
            hash: format!("{:.7}", commit.id()),
            message,
            author,
            timestamp,
        }
    }
}

/// The last `max_count` commits reachable from `tip`, most recent first.
pub fn list_recent_commits(repo: &Repository, tip: Oid, max_count: usize) -> Result<Vec<CommitInfo>> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(tip)?;
    revwalk.set_sorting(Sort::TIME)?;

    let mut commits = Vec::with_capacity(max_count);
    for oid in revwalk.take(max_count) {
        let commit = repo.find_commit(oid?)?;
        commits.push(CommitInfo::from_commit(&commit));
    }
    Ok(commits)
}

fn entry_id(commit: &Commit<'_>, path: &Path) -> Option<Oid> {
    commit.tree().ok()?.get_path(path).ok().map(|e| e.id())
}

/// Commit time (ms since epoch) of the most recent commit reachable from
/// `tip` that changed `path`, including the commit that deleted it.
///
/// Scans at most `depth` commits along first parents; when nothing is found
/// the tip's own time is returned.
pub fn last_touch_ms(repo: &Repository, tip: Oid, path: &Path, depth: usize) -> Result<i64> {
    let tip_commit = repo.find_commit(tip)?;
    let mut current = tip_commit.clone();

    for _ in 0..depth {
        let here = entry_id(&current, path);
        let parent = match current.parent(0) {
            Ok(p) => p,
            Err(_) => {
                // Root commit: it touched the path iff it contains it
                if here.is_some() {
                    return Ok(current.time().seconds() * 1000);
                }
                break;
            }
        };
        if entry_id(&parent, path) != here {
            return Ok(current.time().seconds() * 1000);
        }
        current = parent;
    }

    Ok(tip_commit.time().seconds() * 1000)
}
