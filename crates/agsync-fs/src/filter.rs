//! Sync-eligibility classification
//!
//! A path is excluded when any pattern from any source matches it. Sources
//! are, in order: the built-in protections, patterns from configuration, and
//! the optional `.syncignore` file at the working-directory root. Order does
//! not affect the result.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::constants::SyncPath;
use crate::{Error, NormalizedPath, Result, conflict};

/// Credentials, tokens, large media, OS housekeeping and engine internals.
/// Not overridable by configuration.
pub const BUILTIN_EXCLUDES: &[&str] = &[
    // credentials and tokens
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
    "**/*.p12",
    "**/*.pfx",
    "**/id_rsa*",
    "**/id_ed25519*",
    "**/credentials*.json",
    "**/oauth*.json",
    "**/token*.json",
    "**/*secret*",
    "**/.netrc",
    // large binaries and media
    "**/*.mp4",
    "**/*.mov",
    "**/*.avi",
    "**/*.mkv",
    "**/*.webm",
    "**/*.mp3",
    "**/*.wav",
    "**/*.zip",
    "**/*.tar",
    "**/*.tar.gz",
    "**/*.tgz",
    "**/*.7z",
    "**/*.rar",
    "**/*.iso",
    "**/*.dmg",
    "**/*.exe",
    // OS housekeeping
    "**/.DS_Store",
    "**/Thumbs.db",
    "**/desktop.ini",
    "**/*.swp",
    "**/*.tmp",
    "**/*~",
    // engine internals
    "**/.git",
    "**/.git/**",
    "**/.sync",
    "**/.sync/**",
    "**/.sync.lock",
    "**/.sync-conflicts",
    "**/.sync-conflicts/**",
    "**/*.conflict-*",
    "**/*.remote-[0-9]*",
];

/// Classifies relative paths as sync-eligible or excluded.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    set: GlobSet,
    pattern_count: usize,
}

impl FilterEngine {
    /// Build from built-ins plus user patterns.
    pub fn new(user_patterns: &[String]) -> Result<Self> {
        Self::build(user_patterns.iter().map(String::as_str))
    }

    /// Build from built-ins, user patterns and the ignore file under `root`.
    pub fn for_root(root: &Path, user_patterns: &[String]) -> Result<Self> {
        let ignore_path = root.join(SyncPath::IgnoreFile);
        let ignore_lines = match std::fs::read_to_string(&ignore_path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io(ignore_path, e)),
        };
        Self::build(
            user_patterns
                .iter()
                .chain(ignore_lines.iter())
                .map(String::as_str),
        )
    }

    fn build<'a>(user: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut count = 0;

        for pattern in BUILTIN_EXCLUDES {
            add_glob(&mut builder, pattern)?;
            count += 1;
        }

        for raw in user {
            for expanded in expand_user_pattern(raw) {
                add_glob(&mut builder, &expanded)?;
                count += 1;
            }
        }

        let set = builder.build().map_err(|source| Error::Pattern {
            pattern: "<set>".into(),
            source,
        })?;
        Ok(Self {
            set,
            pattern_count: count,
        })
    }

    /// Number of compiled globs, built-ins included.
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    /// True when the path is excluded by any pattern.
    pub fn is_excluded(&self, path: &NormalizedPath) -> bool {
        self.set.is_match(path.as_str())
            || path
                .file_name()
                .is_some_and(conflict::is_conflict_artifact)
    }

    pub fn is_included(&self, path: &NormalizedPath) -> bool {
        !self.is_excluded(path)
    }

    /// Walk only the managed folders beneath `root` and return every
    /// sync-eligible file, sorted.
    pub fn files_to_sync(&self, root: &Path, folders: &[String]) -> Result<Vec<NormalizedPath>> {
        let mut files = Vec::new();

        for folder in folders {
            if !is_valid_folder_name(folder) {
                warn!(folder = %folder, "Ignoring invalid managed folder name");
                continue;
            }
            let folder_root = root.join(folder);
            if !folder_root.is_dir() {
                debug!(folder = %folder, "Managed folder absent, skipping");
                continue;
            }

            let walker = WalkDir::new(&folder_root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    match NormalizedPath::relative(root, entry.path()) {
                        Some(rel) => !self.is_excluded(&rel),
                        None => true,
                    }
                });

            for entry in walker {
                let entry = entry.map_err(|source| Error::Walk {
                    path: folder_root.clone(),
                    source,
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(rel) = NormalizedPath::relative(root, entry.path()) {
                    files.push(rel);
                }
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }
}

/// A managed folder is a single path component that is not engine metadata.
pub fn is_valid_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && name != SyncPath::SyncDir.as_str()
        && name != SyncPath::GitDir.as_str()
}

fn add_glob(builder: &mut GlobSetBuilder, pattern: &str) -> Result<()> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
    builder.add(glob);
    Ok(())
}

/// Turn one gitignore-style line into globs over root-relative paths.
///
/// Unanchored patterns match at any depth; every pattern also covers the
/// contents of a matching directory.
fn expand_user_pattern(raw: &str) -> Vec<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }
    if line.starts_with('!') {
        warn!(pattern = %line, "Negated patterns are not supported; ignoring");
        return Vec::new();
    }

    let body = line.trim_end_matches('/');
    let base = match body.strip_prefix('/') {
        Some(anchored) => anchored.to_string(),
        None if body.contains('/') || body.starts_with("**") => body.to_string(),
        None => format!("**/{body}"),
    };
    vec![base.clone(), format!("{base}/**")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("brain/notes.md", false)]
    #[case("brain/.env", true)]
    #[case("brain/keys/server.pem", true)]
    #[case("knowledge/oauth_creds.json", true)]
    #[case("brain/video.mp4", true)]
    #[case("brain/.DS_Store", true)]
    #[case("brain/.git/config", true)]
    #[case("brain/.sync/password.sha256", true)]
    #[case("brain/notes.conflict-laptop-20240101-120000.md", true)]
    #[case("brain/notes.remote-20240101-120000.md", true)]
    #[case("brain/my.remote-config.json", false)]
    fn builtin_classification(#[case] path: &str, #[case] excluded: bool) {
        let filter = FilterEngine::new(&[]).unwrap();
        assert_eq!(filter.is_excluded(&NormalizedPath::new(path)), excluded, "{path}");
    }

    #[rstest]
    #[case("*.log", "brain/deep/run.log", true)]
    #[case("*.log", "brain/run.txt", false)]
    #[case("cache/", "brain/cache/x.bin", true)]
    #[case("/brain/tmp", "brain/tmp/a.md", true)]
    #[case("/brain/tmp", "other/brain/tmp/a.md", false)]
    #[case("brain/**/*.draft", "brain/a/b/c.draft", true)]
    fn user_patterns(#[case] pattern: &str, #[case] path: &str, #[case] excluded: bool) {
        let filter = FilterEngine::new(&[pattern.to_string()]).unwrap();
        assert_eq!(filter.is_excluded(&NormalizedPath::new(path)), excluded);
    }

    #[test]
    fn comments_and_negations_are_skipped() {
        assert!(expand_user_pattern("# comment").is_empty());
        assert!(expand_user_pattern("!keep.md").is_empty());
        assert!(expand_user_pattern("   ").is_empty());
    }

    #[test]
    fn folder_names_must_be_single_components() {
        assert!(is_valid_folder_name("brain"));
        assert!(!is_valid_folder_name("../etc"));
        assert!(!is_valid_folder_name("a/b"));
        assert!(!is_valid_folder_name(".sync"));
    }
}
