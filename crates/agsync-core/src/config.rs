//! Sync configuration and where it comes from
//!
//! [`SyncConfig`] is read fresh at the start of every operation through a
//! [`ConfigProvider`], so settings edited between cycles take effect on the
//! next one without a restart.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use agsync_fs::filter::is_valid_folder_name;
use agsync_fs::{NormalizedPath, SyncPath, io};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Conflict-resolution tunables.
///
/// These are heuristics, not protocol. "Larger wins" for binary files
/// assumes size tracks completeness, which holds for append-style data and
/// not for re-encoded formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Relative size difference above which the larger binary file wins
    pub binary_size_ratio: f64,
    /// Two mtimes closer than this are considered equal
    pub mtime_tolerance_ms: i64,
    /// Age after which a lock marker is considered abandoned
    pub lock_stale_after_secs: u64,
    /// Extensions (lowercase, no dot) treated as binary-like
    pub binary_extensions: Vec<String>,
    /// Commits scanned when looking up a path's last remote change
    pub remote_history_depth: usize,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            binary_size_ratio: 0.20,
            mtime_tolerance_ms: 1000,
            lock_stale_after_secs: 300,
            binary_extensions: [
                "pb", "bin", "db", "sqlite", "png", "jpg", "jpeg", "gif", "webp", "pdf", "wasm",
                "onnx", "pt", "safetensors",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            remote_history_depth: 500,
        }
    }
}

impl MergePolicy {
    pub fn is_binary(&self, path: &NormalizedPath) -> bool {
        path.extension()
            .is_some_and(|ext| self.binary_extensions.iter().any(|b| b.eq_ignore_ascii_case(ext)))
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }
}

/// Everything one sync cycle needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote repository, never carrying credentials
    pub repository_url: Option<String>,
    pub enabled: bool,
    pub auto_sync: bool,
    pub sync_interval_minutes: u64,
    /// Top-level folders of the working directory that are synchronized
    pub folders: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// The editor's working directory
    pub local_path: PathBuf,
    /// Where the engine keeps its clone
    pub repository_path: PathBuf,
    /// Data root inside the repository
    pub repository_subdir: String,
    pub sync_password_enabled: bool,
    pub branch: String,
    /// Tag written into conflict artifact names
    pub device_name: String,
    /// Quiet period before watcher-triggered pushes
    pub debounce_seconds: u64,
    pub policy: MergePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));
        Self {
            repository_url: None,
            enabled: true,
            auto_sync: true,
            sync_interval_minutes: 5,
            folders: vec![
                "brain".to_string(),
                "knowledge".to_string(),
                "conversations".to_string(),
            ],
            exclude_patterns: Vec::new(),
            local_path: home.join(".gemini").join("antigravity"),
            repository_path: data.join("agsync").join("repo"),
            repository_subdir: SyncPath::DefaultSubdir.as_str().to_string(),
            sync_password_enabled: false,
            branch: "main".to_string(),
            device_name: default_device_name(),
            debounce_seconds: 30,
            policy: MergePolicy::default(),
        }
    }
}

fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "device".to_string())
}

impl SyncConfig {
    /// A config pointed at explicit paths, everything else default.
    pub fn with_paths(local_path: impl Into<PathBuf>, repository_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
            repository_path: repository_path.into(),
            ..Self::default()
        }
    }

    /// The repository URL, or a configuration error naming what is missing.
    pub fn require_url(&self) -> Result<&str> {
        self.repository_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::config("no repository URL configured"))
    }

    /// Directory inside the repository that mirrors the managed folders.
    pub fn mirror_root(&self) -> PathBuf {
        self.repository_path.join(&self.repository_subdir)
    }

    /// `.sync/` metadata directory inside the mirror.
    pub fn metadata_dir(&self) -> PathBuf {
        self.mirror_root().join(SyncPath::SyncDir)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes.max(1) * 60)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    /// Add or remove one managed folder.
    pub fn set_folder_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        if !is_valid_folder_name(name) {
            return Err(Error::config(format!("invalid folder name: {name:?}")));
        }
        let present = self.folders.iter().any(|f| f == name);
        match (enabled, present) {
            (true, false) => self.folders.push(name.to_string()),
            (false, true) => self.folders.retain(|f| f != name),
            _ => {}
        }
        Ok(())
    }

    /// Reject settings that would make the engine touch the wrong files.
    pub fn validate(&self) -> Result<()> {
        if self.folders.is_empty() {
            return Err(Error::config("no folders selected for sync"));
        }
        if let Some(bad) = self.folders.iter().find(|f| !is_valid_folder_name(f)) {
            return Err(Error::config(format!("invalid folder name: {bad:?}")));
        }
        if !is_valid_folder_name(&self.repository_subdir) {
            return Err(Error::config(format!(
                "invalid repository subdirectory: {:?}",
                self.repository_subdir
            )));
        }
        if self.repository_path.starts_with(&self.local_path) {
            return Err(Error::config(
                "the repository must not live inside the working directory",
            ));
        }
        if !(0.0..=1.0).contains(&self.policy.binary_size_ratio) {
            return Err(Error::config("policy.binary_size_ratio must be between 0 and 1"));
        }
        Ok(())
    }
}

/// Source of [`SyncConfig`].
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<SyncConfig>;

    fn save(&self, config: &SyncConfig) -> Result<()>;

    fn clear_repository_url(&self) -> Result<()> {
        let mut config = self.load()?;
        config.repository_url = None;
        self.save(&config)
    }
}

/// TOML file on disk, re-read on every `load`.
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/agsync/config.toml`
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| Error::config("no configuration directory on this platform"))?;
        Ok(Self::new(dir.join("agsync").join("config.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<SyncConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No config file, using defaults");
                return Ok(SyncConfig::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&content)?)
    }

    fn save(&self, config: &SyncConfig) -> Result<()> {
        let content = toml::to_string_pretty(config)?;
        io::write_atomic(&self.path, content.as_bytes())?;
        debug!(path = %self.path.display(), "Saved config");
        Ok(())
    }
}

/// In-memory provider for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryConfigProvider {
    config: Mutex<SyncConfig>,
}

impl MemoryConfigProvider {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Edit the stored config in place.
    pub fn update(&self, edit: impl FnOnce(&mut SyncConfig)) {
        let mut guard = self.config.lock().unwrap_or_else(|p| p.into_inner());
        edit(&mut guard);
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn load(&self) -> Result<SyncConfig> {
        Ok(self.config.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, config: &SyncConfig) -> Result<()> {
        *self.config.lock().unwrap_or_else(|p| p.into_inner()) = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            repository_url = "https://example.com/me/sync.git"
            folders = ["brain"]

            [policy]
            binary_size_ratio = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.folders, vec!["brain".to_string()]);
        assert_eq!(config.sync_interval_minutes, 5);
        assert_eq!(config.repository_subdir, ".antigravity-sync");
        assert_eq!(config.policy.binary_size_ratio, 0.5);
        assert_eq!(config.policy.mtime_tolerance_ms, 1000);
    }

    #[test]
    fn toml_provider_round_trips_and_clears_url() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("agsync/config.toml"));
        assert_eq!(provider.load().unwrap().repository_url, None);

        let mut config = SyncConfig::with_paths(dir.path().join("local"), dir.path().join("repo"));
        config.repository_url = Some("https://example.com/r.git".into());
        provider.save(&config).unwrap();
        assert_eq!(provider.load().unwrap(), config);

        provider.clear_repository_url().unwrap();
        assert_eq!(provider.load().unwrap().repository_url, None);
    }

    #[test]
    fn folder_toggles() {
        let mut config = SyncConfig::default();
        config.set_folder_enabled("conversations", false).unwrap();
        config.set_folder_enabled("skills", true).unwrap();
        config.set_folder_enabled("skills", true).unwrap();

        assert_eq!(config.folders, vec!["brain", "knowledge", "skills"]);
        assert!(config.set_folder_enabled("../etc", true).is_err());
    }

    #[test]
    fn validate_rejects_repo_inside_working_dir() {
        let config = SyncConfig::with_paths("/home/u/work", "/home/u/work/repo");
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn require_url_reports_missing() {
        let config = SyncConfig::default();
        assert!(matches!(config.require_url(), Err(Error::Configuration { .. })));
    }

    #[rstest]
    #[case("model.bin", true)]
    #[case("brain/state.PB", true)]
    #[case("notes.pbtxt", false)]
    #[case("README", false)]
    fn binary_classification(#[case] path: &str, #[case] binary: bool) {
        assert_eq!(MergePolicy::default().is_binary(&NormalizedPath::new(path)), binary);
    }
}
