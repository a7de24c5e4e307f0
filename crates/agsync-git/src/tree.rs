//! Content-addressed lookups against commits

use std::path::Path;

use agsync_fs::NormalizedPath;
use git2::{Oid, Repository};

use crate::Result;

/// A file as recorded in one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub id: Oid,
    pub size: u64,
}

/// Blob id and size for `path` in `commit`, or `None` if absent.
pub fn blob_info(repo: &Repository, commit: Oid, path: &NormalizedPath) -> Result<Option<BlobInfo>> {
    let tree = repo.find_commit(commit)?.tree()?;
    let entry = match tree.get_path(Path::new(path.as_str())) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.kind() != Some(git2::ObjectType::Blob) {
        return Ok(None);
    }
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(BlobInfo {
        id: entry.id(),
        size: blob.size() as u64,
    }))
}

/// Bytes of `path` in `commit`, or `None` if absent.
pub fn read_blob(repo: &Repository, commit: Oid, path: &NormalizedPath) -> Result<Option<Vec<u8>>> {
    match blob_info(repo, commit, path)? {
        Some(info) => Ok(Some(repo.find_blob(info.id)?.content().to_vec())),
        None => Ok(None),
    }
}

/// Paths whose content differs between two commits. `from = None` means
/// the empty tree.
pub fn diff_paths(repo: &Repository, from: Option<Oid>, to: Oid) -> Result<Vec<NormalizedPath>> {
    let old_tree = match from {
        Some(oid) => Some(repo.find_commit(oid)?.tree()?),
        None => None,
    };
    let new_tree = repo.find_commit(to)?.tree()?;
    let diff = repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;

    let mut paths = Vec::new();
    for delta in diff.deltas() {
        for file in [delta.old_file(), delta.new_file()] {
            if let Some(p) = file.path() {
                paths.push(NormalizedPath::new(p));
            }
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}
