//! Multi-device sync scenarios
//!
//! Each device is a separate replica (working directory + clone) with its
//! own orchestrator, all pointed at one local bare remote.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agsync_core::{
    ConfigProvider, Error, EventBus, MemoryConfigProvider, MemoryCredentialStore, SyncConfig,
    SyncOrchestrator, SyncReport,
};
use agsync_test_utils::{BareRemote, Replica};
use pretty_assertions::assert_eq;

const TOKEN: &str = "ghp_integration";

fn data(rel: &str) -> String {
    format!(".antigravity-sync/{rel}")
}

struct Device {
    name: &'static str,
    replica: Replica,
    config: Arc<MemoryConfigProvider>,
    engine: Arc<SyncOrchestrator>,
}

impl Device {
    fn new(name: &'static str) -> Self {
        let replica = Replica::new();
        let mut config = SyncConfig::with_paths(replica.local_root(), replica.repo_root());
        config.device_name = name.to_string();
        config.auto_sync = false;
        let config = Arc::new(MemoryConfigProvider::new(config));
        let credentials = Arc::new(MemoryCredentialStore::new());
        let engine = Arc::new(SyncOrchestrator::new(
            config.clone(),
            credentials,
            EventBus::default(),
        ));
        Self {
            name,
            replica,
            config,
            engine,
        }
    }

    fn join(name: &'static str, remote: &BareRemote) -> Self {
        let device = Self::new(name);
        device.engine.connect(&remote.url(), TOKEN, None).unwrap();
        device
    }

    fn config_url(&self) -> Option<String> {
        self.config.load().unwrap().repository_url
    }

    fn sync(&self) -> SyncReport {
        self.engine
            .sync()
            .unwrap()
            .completed()
            .unwrap_or_else(|| panic!("{}: sync was skipped", self.name))
    }
}

#[test]
fn two_devices_converge() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/a.md", "from the laptop");
    laptop.sync();

    let desktop = Device::join("desktop", &remote);
    assert_eq!(desktop.replica.read_local("brain/a.md").as_deref(), Some("from the laptop"));

    desktop.replica.write_local("knowledge/k.md", "from the desktop");
    desktop.sync();
    laptop.sync();

    assert_eq!(laptop.replica.read_local("knowledge/k.md").as_deref(), Some("from the desktop"));
    assert!(laptop.replica.conflict_artifacts().is_empty());
    assert!(desktop.replica.conflict_artifacts().is_empty());
}

#[test]
fn edits_to_different_files_merge_without_artifacts() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/notes.pbtxt", "notes v1");
    laptop.replica.write_local("brain/model.bin", "weights v1");
    laptop.sync();
    let desktop = Device::join("desktop", &remote);

    laptop.replica.write_local("brain/notes.pbtxt", "notes v2 from laptop");
    desktop.replica.write_local("brain/model.bin", "weights v2 from the desktop");
    laptop.sync();
    let report = desktop.sync();
    laptop.sync();

    assert!(report.merge.is_none());
    for device in [&laptop, &desktop] {
        assert_eq!(
            device.replica.read_local("brain/notes.pbtxt").as_deref(),
            Some("notes v2 from laptop")
        );
        assert_eq!(
            device.replica.read_local("brain/model.bin").as_deref(),
            Some("weights v2 from the desktop")
        );
        assert!(device.replica.conflict_artifacts().is_empty());
    }
}

#[test]
fn stale_edit_loses_to_newer_edit_and_is_preserved() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/notes.pbtxt", "base");
    laptop.sync();
    let desktop = Device::join("desktop", &remote);

    laptop.replica.write_local("brain/notes.pbtxt", "fresh laptop notes");
    laptop.sync();
    desktop.replica.write_local("brain/notes.pbtxt", "old desktop notes");
    desktop.replica.set_local_mtime("brain/notes.pbtxt", 1_700_000_000);
    let report = desktop.sync();

    let merge = report.merge.expect("overlapping edits need Smart Merge");
    assert_eq!(merge.took_remote, 1);
    assert_eq!(
        desktop.replica.read_local("brain/notes.pbtxt").as_deref(),
        Some("fresh laptop notes")
    );
    let artifacts = desktop.replica.conflict_artifacts();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].starts_with("notes.conflict-desktop-"), "{artifacts:?}");

    laptop.sync();
    assert_eq!(
        laptop.replica.read_local("brain/notes.pbtxt").as_deref(),
        Some("fresh laptop notes")
    );
    assert_eq!(
        remote.read(&data("brain/notes.pbtxt")).as_deref(),
        Some("fresh laptop notes")
    );
}

#[test]
fn remote_deletion_reaches_every_device() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/old.pb", "obsolete");
    laptop.replica.write_local("brain/keep.md", "keep");
    laptop.sync();
    let desktop = Device::join("desktop", &remote);
    assert!(desktop.replica.local_exists("brain/old.pb"));

    remote.delete_files(&[&data("brain/old.pb")], "clean up", None);
    laptop.sync();
    desktop.sync();

    for device in [&laptop, &desktop] {
        assert!(!device.replica.local_exists("brain/old.pb"), "{}", device.name);
        assert!(device.replica.local_exists("brain/keep.md"));
    }
}

#[test]
fn local_deletion_is_not_published() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/a.md", "keep me");
    laptop.sync();

    std::fs::remove_file(laptop.replica.local_root().join("brain/a.md")).unwrap();
    laptop.sync();

    assert_eq!(remote.read(&data("brain/a.md")).as_deref(), Some("keep me"));
}

#[test]
fn excluded_files_never_leave_the_device() {
    let remote = BareRemote::new();
    let laptop = Device::new("laptop");
    laptop.config.update(|c| c.exclude_patterns = vec!["**/*.log".to_string()]);
    laptop.engine.connect(&remote.url(), TOKEN, None).unwrap();

    laptop.replica.write_local(".syncignore", "brain/drafts/**\n");
    laptop.replica.write_local("brain/ok.md", "share me");
    laptop.replica.write_local("brain/.env", "API_KEY=1");
    laptop.replica.write_local("brain/debug.log", "noise");
    laptop.replica.write_local("brain/drafts/wip.md", "private");
    laptop.replica.write_local("brain/clip.mp4", "video");
    laptop.sync();

    assert_eq!(remote.read(&data("brain/ok.md")).as_deref(), Some("share me"));
    for hidden in ["brain/.env", "brain/debug.log", "brain/drafts/wip.md", "brain/clip.mp4"] {
        assert_eq!(remote.read(&data(hidden)), None, "{hidden} was published");
    }

    let desktop = Device::join("desktop", &remote);
    assert_eq!(desktop.replica.list_local("brain"), vec!["ok.md".to_string()]);
}

#[test]
fn password_gates_joining_devices() {
    let remote = BareRemote::new();
    let laptop = Device::new("laptop");
    laptop.engine.connect(&remote.url(), TOKEN, Some("correct horse")).unwrap();
    laptop.replica.write_local("brain/a.md", "secret plans");
    laptop.sync();

    let intruder = Device::new("intruder");
    let err = intruder
        .engine
        .connect(&remote.url(), TOKEN, Some("battery staple"))
        .unwrap_err();
    assert!(matches!(err, Error::PasswordMismatch));
    assert_eq!(intruder.config_url(), None);

    let desktop = Device::new("desktop");
    desktop.engine.connect(&remote.url(), TOKEN, Some("correct horse")).unwrap();
    assert_eq!(desktop.replica.read_local("brain/a.md").as_deref(), Some("secret plans"));
}

#[test]
fn sync_resumes_after_a_stuck_lock_goes_stale() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.config.update(|c| c.policy.lock_stale_after_secs = 0);

    // A crashed process left its marker behind ten seconds ago
    let marker = laptop.replica.repo_root().join(".sync.lock");
    let crashed_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis()
        - 10_000;
    std::fs::write(&marker, crashed_at.to_string()).unwrap();

    laptop.replica.write_local("brain/a.md", "after the crash");
    laptop.sync();

    assert!(!marker.exists());
    assert_eq!(remote.read(&data("brain/a.md")).as_deref(), Some("after the crash"));
}

#[test]
fn token_never_lands_in_repository_metadata() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.replica.write_local("brain/a.md", "hello");
    laptop.sync();

    let git_config = std::fs::read_to_string(laptop.replica.repo_root().join(".git/config")).unwrap();
    assert!(git_config.contains(&remote.url()));
    assert!(!git_config.contains(TOKEN));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_pushes_shortly_after_an_edit() {
    let remote = BareRemote::new();
    let laptop = Device::join("laptop", &remote);
    laptop.config.update(|c| {
        c.auto_sync = true;
        c.debounce_seconds = 1;
        c.sync_interval_minutes = 60;
    });
    laptop.replica.write_local("brain/seed.md", "seed");
    laptop.engine.sync().unwrap();

    assert!(laptop.engine.start_auto_sync().unwrap());
    tokio::time::sleep(Duration::from_millis(200)).await;
    laptop.replica.write_local("brain/live.md", "typed just now");

    let deadline = Instant::now() + Duration::from_secs(20);
    while remote.read(&data("brain/live.md")).is_none() {
        assert!(Instant::now() < deadline, "watcher never pushed the edit");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    laptop.engine.stop_auto_sync();
}
