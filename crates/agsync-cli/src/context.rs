//! Wiring from command-line flags to a [`SyncOrchestrator`]

use std::path::PathBuf;
use std::sync::Arc;

use agsync_core::{
    ConfigProvider, CredentialStore, EventBus, FileCredentialStore, SyncConfig, SyncOrchestrator,
    TomlConfigProvider,
};

use crate::error::Result;

/// Where the CLI keeps configuration and credentials.
#[derive(Debug, Clone, Default)]
pub struct Paths {
    pub config: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
}

/// The orchestrator plus the stores it was built from.
pub struct Engine {
    config: Arc<TomlConfigProvider>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl Engine {
    pub fn open(paths: &Paths) -> Result<Self> {
        let config = Arc::new(match &paths.config {
            Some(path) => TomlConfigProvider::new(path),
            None => TomlConfigProvider::default_location()?,
        });
        let credentials = credential_store(paths)?;
        tracing::debug!(config = %config.path().display(), "Opened engine");
        let orchestrator = Arc::new(SyncOrchestrator::new(
            config.clone(),
            credentials,
            EventBus::default(),
        ));
        Ok(Self { config, orchestrator })
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn load_config(&self) -> Result<SyncConfig> {
        Ok(self.config.load()?)
    }

    pub fn save_config(&self, config: &SyncConfig) -> Result<()> {
        Ok(self.config.save(config)?)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.path().to_path_buf()
    }
}

#[cfg(feature = "keyring")]
fn credential_store(paths: &Paths) -> Result<Arc<dyn CredentialStore>> {
    Ok(match &paths.credentials {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(agsync_core::KeyringCredentialStore::default()),
    })
}

#[cfg(not(feature = "keyring"))]
fn credential_store(paths: &Paths) -> Result<Arc<dyn CredentialStore>> {
    Ok(match &paths.credentials {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(FileCredentialStore::default_location()?),
    })
}
