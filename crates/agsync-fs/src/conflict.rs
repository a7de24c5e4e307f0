//! Conflict artifact naming and storage
//!
//! Artifacts keep the losing side of a conflict decision for manual review.
//! They live under `.sync-conflicts/` at the repository root, mirroring the
//! relative directory of the file they came from, and their names carry a
//! marker the filter always excludes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;
use walkdir::WalkDir;

use crate::constants::{CONFLICT_MARKER, REMOTE_MARKER, SyncPath};
use crate::{Error, NormalizedPath, Result, io};

/// `YYYYMMDD-HHMMSS`, safe on every filesystem.
pub fn sanitize_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}

/// Reduce a device name to `[a-z0-9-]`, never empty.
pub fn sanitize_device_tag(device: &str) -> String {
    let mut tag = String::with_capacity(device.len());
    for c in device.chars() {
        if c.is_ascii_alphanumeric() {
            tag.push(c.to_ascii_lowercase());
        } else if !tag.ends_with('-') {
            tag.push('-');
        }
    }
    let tag = tag.trim_matches('-');
    if tag.is_empty() {
        "device".to_string()
    } else {
        tag.to_string()
    }
}

/// `<stem>.conflict-<device>-<timestamp><ext>`
pub fn conflict_artifact_name(path: &NormalizedPath, device: &str, at: DateTime<Local>) -> String {
    let (stem, ext) = path.split_name();
    format!(
        "{stem}{CONFLICT_MARKER}{}-{}{ext}",
        sanitize_device_tag(device),
        sanitize_timestamp(at)
    )
}

/// `<stem>.remote-<timestamp><ext>`
pub fn remote_artifact_name(path: &NormalizedPath, at: DateTime<Local>) -> String {
    let (stem, ext) = path.split_name();
    format!("{stem}{REMOTE_MARKER}{}{ext}", sanitize_timestamp(at))
}

/// True for file names produced by either artifact naming scheme.
pub fn is_conflict_artifact(file_name: &str) -> bool {
    if file_name.contains(CONFLICT_MARKER) {
        return true;
    }
    file_name.match_indices(REMOTE_MARKER).any(|(idx, m)| {
        let rest = &file_name.as_bytes()[idx + m.len()..];
        rest.len() >= 15
            && rest[..8].iter().all(u8::is_ascii_digit)
            && rest[8] == b'-'
            && rest[9..15].iter().all(u8::is_ascii_digit)
    })
}

/// The engine-local directory where artifacts are written.
#[derive(Debug, Clone)]
pub struct ConflictArea {
    root: PathBuf,
}

impl ConflictArea {
    /// Conflict area for the repository rooted at `repo_root`.
    pub fn new(repo_root: &Path) -> Self {
        Self {
            root: repo_root.join(SyncPath::ConflictsDir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for an artifact of `original`, never overwriting an
    /// existing artifact.
    fn destination(&self, original: &NormalizedPath, artifact_name: &str) -> PathBuf {
        let dir = match original.parent() {
            Some(parent) => parent.under(&self.root),
            None => self.root.clone(),
        };
        let candidate = dir.join(artifact_name);
        if !candidate.exists() {
            return candidate;
        }
        let artifact = NormalizedPath::new(artifact_name);
        let (stem, ext) = artifact.split_name();
        (1..)
            .map(|n| dir.join(format!("{stem}-{n}{ext}")))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// Copy `src` into the area as an artifact of `original`.
    pub fn preserve_file(
        &self,
        original: &NormalizedPath,
        artifact_name: &str,
        src: &Path,
    ) -> Result<PathBuf> {
        let dst = self.destination(original, artifact_name);
        io::copy_preserving_times(src, &dst)?;
        info!(original = %original, artifact = %dst.display(), "Preserved conflict artifact");
        Ok(dst)
    }

    /// Write `content` into the area as an artifact of `original`.
    pub fn preserve_bytes(
        &self,
        original: &NormalizedPath,
        artifact_name: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let dst = self.destination(original, artifact_name);
        io::write_with_times(&dst, content, None)?;
        info!(original = %original, artifact = %dst.display(), "Preserved conflict artifact");
        Ok(dst)
    }

    /// All artifact files currently in the area.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|source| Error::Walk {
                path: self.root.clone(),
                source,
            })?;
            if entry.file_type().is_file() {
                out.push(entry.into_path());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Remove the whole area.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.root, e)),
        }
    }
}
