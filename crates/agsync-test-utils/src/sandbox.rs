//! [`Replica`] directories: one simulated device each.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::TempDir;

/// A temporary device: an editor working directory (`local/`) and the
/// engine's versioned mirror (`repo/`).
pub struct Replica {
    dir: TempDir,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl Replica {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("local")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The editor's working directory.
    pub fn local_root(&self) -> PathBuf {
        self.dir.path().join("local")
    }

    /// Where the engine keeps its clone. Not created up front.
    pub fn repo_root(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Write `content` under the working directory, creating parents.
    pub fn write_local(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.local_root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Replica::write_local: {}: {e}", path.display()));
        path
    }

    pub fn read_local(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.local_root().join(rel)).ok()
    }

    pub fn local_exists(&self, rel: &str) -> bool {
        self.local_root().join(rel).exists()
    }

    /// Read a file inside the engine's repository directory.
    pub fn read_repo(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.repo_root().join(rel)).ok()
    }

    /// Set the modification time of a working-directory file (epoch seconds).
    pub fn set_local_mtime(&self, rel: &str, secs: i64) {
        let path = self.local_root().join(rel);
        filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, 0))
            .unwrap_or_else(|e| panic!("Replica::set_local_mtime: {}: {e}", path.display()));
    }

    /// File names directly under `rel` in the working directory, sorted.
    pub fn list_local(&self, rel: &str) -> Vec<String> {
        list_names(&self.local_root().join(rel))
    }

    /// Every file name anywhere under the repository's conflict area.
    pub fn conflict_artifacts(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_files(&self.repo_root().join(".sync-conflicts"), &mut names);
        names.sort();
        names
    }
}

fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn collect_files(dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
}
