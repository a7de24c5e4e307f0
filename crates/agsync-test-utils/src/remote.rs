//! Bare repositories standing in for the hosted remote.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

/// Branch every fixture remote uses.
pub const BRANCH: &str = "main";

/// An empty bare repository on disk, addressed by a `file://` URL.
///
/// Content is written through a throwaway clone so the remote only ever
/// changes the way a real host would: by accepting pushes.
pub struct BareRemote {
    dir: TempDir,
}

impl Default for BareRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl BareRemote {
    /// Create an empty bare repository whose HEAD names `main`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head(BRANCH);
        Repository::init_opts(dir.path(), &opts)
            .unwrap_or_else(|e| panic!("BareRemote::new: failed to init bare repo: {e}"));
        Self { dir }
    }

    /// Create a remote that already holds `files` in one commit.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let remote = Self::new();
        remote.commit_files(files, "seed", None);
        remote
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    fn open(&self) -> Repository {
        Repository::open_bare(self.path())
            .unwrap_or_else(|e| panic!("BareRemote: failed to open bare repo: {e}"))
    }

    /// Tip of `main`, `None` while the remote is empty.
    pub fn head(&self) -> Option<Oid> {
        self.open()
            .find_reference(&format!("refs/heads/{BRANCH}"))
            .ok()
            .and_then(|r| r.target())
    }

    /// Number of commits reachable from `main`.
    pub fn commit_count(&self) -> usize {
        let Some(head) = self.head() else {
            return 0;
        };
        let repo = self.open();
        let mut walk = repo.revwalk().unwrap();
        walk.push(head).unwrap();
        walk.count()
    }

    /// Parent count of the tip commit.
    pub fn head_parent_count(&self) -> usize {
        let repo = self.open();
        let head = self.head().expect("remote has no commits");
        repo.find_commit(head).unwrap().parent_count()
    }

    /// File content at `path` on the tip of `main`.
    pub fn read(&self, path: &str) -> Option<String> {
        let repo = self.open();
        let head = self.head()?;
        let tree = repo.find_commit(head).ok()?.tree().ok()?;
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).ok()?;
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    /// Write `files` and push them as one commit. `time` sets both author
    /// and committer time in epoch seconds.
    pub fn commit_files(&self, files: &[(&str, &str)], message: &str, time: Option<i64>) -> Oid {
        self.with_scratch(message, time, |root| {
            for (rel, content) in files {
                let path = root.join(rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(path, content).unwrap();
            }
        })
    }

    /// Delete `paths` and push the removal as one commit.
    pub fn delete_files(&self, paths: &[&str], message: &str, time: Option<i64>) -> Oid {
        self.with_scratch(message, time, |root| {
            for rel in paths {
                fs::remove_file(root.join(rel))
                    .unwrap_or_else(|e| panic!("BareRemote::delete_files: {rel}: {e}"));
            }
        })
    }

    fn with_scratch(&self, message: &str, time: Option<i64>, edit: impl FnOnce(&Path)) -> Oid {
        let scratch = TempDir::new().unwrap();
        let root: PathBuf = scratch.path().join("w");
        let repo = Repository::clone(&self.url(), &root)
            .unwrap_or_else(|e| panic!("BareRemote: scratch clone failed: {e}"));
        if repo.head().is_err() {
            repo.set_head(&format!("refs/heads/{BRANCH}")).unwrap();
        }

        edit(&root);

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let sig = match time {
            Some(secs) => Signature::new("Remote Device", "remote@example.com", &Time::new(secs, 0)),
            None => Signature::now("Remote Device", "remote@example.com"),
        }
        .unwrap();
        let parent = repo.head().ok().and_then(|h| h.target()).map(|oid| repo.find_commit(oid).unwrap());
        let parents: Vec<_> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();

        let mut origin = repo.find_remote("origin").unwrap();
        let refspec = format!("refs/heads/{BRANCH}:refs/heads/{BRANCH}");
        origin
            .push(&[refspec.as_str()], None)
            .unwrap_or_else(|e| panic!("BareRemote: scratch push failed: {e}"));
        oid
    }
}
