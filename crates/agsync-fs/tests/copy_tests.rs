//! Change-copy behaviour in both directions

use agsync_fs::copy::InboundScope;
use agsync_fs::{ChangeCopyEngine, ConflictArea, CopyOptions, FilterEngine, NormalizedPath};
use filetime::FileTime;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Sandbox {
    local: TempDir,
    repo: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            local: TempDir::new().unwrap(),
            repo: TempDir::new().unwrap(),
        }
    }

    fn mirror(&self) -> std::path::PathBuf {
        self.repo.path().join(".antigravity-sync")
    }

    fn engine(&self) -> ChangeCopyEngine {
        ChangeCopyEngine::new(
            self.local.path(),
            self.mirror(),
            vec!["brain".into(), "knowledge".into()],
            FilterEngine::for_root(self.local.path(), &[]).unwrap(),
            ConflictArea::new(self.repo.path()),
            CopyOptions {
                mtime_tolerance_ms: 1000,
                device_tag: "laptop".into(),
            },
        )
    }
}

fn write_at(path: &Path, content: &[u8], unix_secs: i64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
}

#[test]
fn copy_skip_performs_no_writes_for_identical_stamps() {
    let sb = Sandbox::new();
    let t = 1_700_000_000;
    write_at(&sb.local.path().join("brain/a.md"), b"local", t);
    // Same size and mtime, different bytes: a skip leaves the bytes alone
    write_at(&sb.mirror().join("brain/a.md"), b"REPOS", t);

    let stats = sb.engine().copy_local_to_repo().unwrap();

    assert_eq!(stats.copied, 0);
    assert_eq!(fs::read(sb.mirror().join("brain/a.md")).unwrap(), b"REPOS");
}

#[test]
fn local_newer_text_file_keeps_local_and_preserves_remote() {
    let sb = Sandbox::new();
    let t = 1_700_000_000;
    let local_bytes = vec![b'L'; 500];
    let remote_bytes = vec![b'R'; 500];
    write_at(&sb.local.path().join("brain/notes.pbtxt"), &local_bytes, t);
    write_at(&sb.mirror().join("brain/notes.pbtxt"), &remote_bytes, t - 3600);

    let stats = sb.engine().copy_repo_to_local(None).unwrap();

    assert_eq!(stats.skipped_local_newer, 1);
    assert_eq!(stats.conflicts_created, 1);
    assert_eq!(stats.copied, 0);
    assert_eq!(fs::read(sb.local.path().join("brain/notes.pbtxt")).unwrap(), local_bytes);

    let artifacts = ConflictArea::new(sb.repo.path()).list().unwrap();
    assert_eq!(artifacts.len(), 1);
    let name = artifacts[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("notes.remote-"), "{name}");
    assert!(name.ends_with(".pbtxt"), "{name}");
    assert_eq!(fs::read(&artifacts[0]).unwrap(), remote_bytes);
}

#[test]
fn remote_newer_overwrites_and_propagates_mtime() {
    let sb = Sandbox::new();
    let t = 1_700_000_000;
    write_at(&sb.local.path().join("brain/a.md"), b"old", t - 100);
    write_at(&sb.mirror().join("brain/a.md"), b"newer!", t);
    let baseline = [(
        NormalizedPath::new("brain/a.md"),
        agsync_fs::FileRecord {
            path: "brain/a.md".into(),
            size: 3,
            mtime_ms: (t - 100) * 1000,
        },
    )]
    .into_iter()
    .collect();
    let scope = InboundScope {
        changed: [NormalizedPath::new("brain/a.md")].into_iter().collect(),
        baseline,
    };

    let stats = sb.engine().copy_repo_to_local(Some(&scope)).unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(stats.conflicts_created, 0);
    let local = sb.local.path().join("brain/a.md");
    assert_eq!(fs::read(&local).unwrap(), b"newer!");
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&local).unwrap());
    assert_eq!(mtime.unix_seconds(), t);
}

#[test]
fn overwriting_an_unsynced_local_edit_leaves_an_artifact() {
    let sb = Sandbox::new();
    let t = 1_700_000_000;
    write_at(&sb.local.path().join("brain/a.md"), b"my edit", t - 100);
    write_at(&sb.mirror().join("brain/a.md"), b"their edit", t);

    let stats = sb.engine().copy_repo_to_local(None).unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(stats.conflicts_created, 1);
    let artifacts = ConflictArea::new(sb.repo.path()).list().unwrap();
    assert_eq!(fs::read(&artifacts[0]).unwrap(), b"my edit");
    assert!(
        artifacts[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains(".conflict-laptop-")
    );
}

#[test]
fn equal_bytes_with_skewed_mtime_is_not_a_conflict() {
    let sb = Sandbox::new();
    write_at(&sb.local.path().join("brain/a.md"), b"same", 1_700_000_000);
    write_at(&sb.mirror().join("brain/a.md"), b"same", 1_600_000_000);

    let stats = sb.engine().copy_repo_to_local(None).unwrap();

    assert_eq!(stats, Default::default());
    assert!(ConflictArea::new(sb.repo.path()).list().unwrap().is_empty());
}

#[test]
fn inbound_skips_equal_size_within_mtime_tolerance() {
    let sb = Sandbox::new();
    let t = 1_700_000_000;
    write_at(&sb.local.path().join("brain/a.md"), b"AAAA", t);
    let remote = sb.mirror().join("brain/a.md");
    write_at(&remote, b"BBBB", t);
    filetime::set_file_mtime(&remote, FileTime::from_unix_time(t, 500_000_000)).unwrap();

    let stats = sb.engine().copy_repo_to_local(None).unwrap();

    assert_eq!(stats, Default::default());
    assert_eq!(fs::read(sb.local.path().join("brain/a.md")).unwrap(), b"AAAA");
    assert!(ConflictArea::new(sb.repo.path()).list().unwrap().is_empty());
}

#[test]
fn artifacts_in_mirror_are_counted_and_never_copied() {
    let sb = Sandbox::new();
    write_at(
        &sb.mirror().join("brain/a.conflict-desk-20240101-000000.md"),
        b"x",
        1_700_000_000,
    );
    write_at(&sb.mirror().join("brain/.sync/password.sha256"), b"x", 1_700_000_000);

    let stats = sb.engine().copy_repo_to_local(None).unwrap();

    assert_eq!(stats.conflicts_skipped, 1);
    assert_eq!(stats.copied, 0);
    assert!(!sb.local.path().join("brain/a.conflict-desk-20240101-000000.md").exists());
    assert!(!sb.local.path().join("brain/.sync").exists());
}

#[test]
fn ignore_file_patterns_apply_to_outbound() {
    let sb = Sandbox::new();
    fs::write(sb.local.path().join(".syncignore"), "# scratch\n*.scratch\n").unwrap();
    write_at(&sb.local.path().join("brain/a.scratch"), b"x", 1_700_000_000);
    write_at(&sb.local.path().join("knowledge/b.md"), b"y", 1_700_000_000);

    let stats = sb.engine().copy_local_to_repo().unwrap();

    assert_eq!(stats.copied, 1);
    assert!(sb.mirror().join("knowledge/b.md").exists());
    assert!(!sb.mirror().join("brain/a.scratch").exists());
}
