//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Antigravity Sync - keep editor state in step across machines
#[derive(Parser, Debug)]
#[command(name = "agsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "AGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Credential file used instead of the default store
    #[arg(long, global = true, env = "AGSYNC_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect to a sync repository and run the first initialisation
    ///
    /// The token is checked against the remote before anything is saved.
    ///
    /// Examples:
    ///   agsync connect https://github.com/me/ag-state.git --token ghp_...
    ///   agsync connect <url> --token <t> --password <group password>
    Connect {
        /// Repository URL (credentials in the URL are discarded)
        url: String,

        /// Access token for the repository
        #[arg(short, long, env = "AGSYNC_TOKEN", hide_env_values = true)]
        token: String,

        /// Shared sync password for this group of devices
        #[arg(short, long, env = "AGSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Working directory to sync
        #[arg(long)]
        local_path: Option<PathBuf>,

        /// Where to keep the local clone
        #[arg(long)]
        repository_path: Option<PathBuf>,

        /// Tag used in conflict artifact names
        #[arg(long)]
        device: Option<String>,
    },

    /// Re-run initialisation against the configured repository
    Init,

    /// Pull remote changes, then publish local ones
    Sync,

    /// Publish local changes (pulls first)
    Push,

    /// Bring remote changes into the working directory
    Pull,

    /// Show pending changes and sync state
    Status {
        /// Include a preview of pending files and recent commits
        #[arg(short, long)]
        detailed: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Replace the shared sync password
    ResetPassword {
        /// The new password
        #[arg(short, long, env = "AGSYNC_NEW_PASSWORD", hide_env_values = true)]
        password: String,

        /// Access token used to re-verify the repository
        #[arg(short, long, env = "AGSYNC_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Sync on an interval and push shortly after local edits
    Watch,

    /// Manage which top-level folders are synchronized
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Forget the remote and stored credentials; files are kept
    Disconnect,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FolderAction {
    /// List synchronized folders
    List,
    /// Start synchronizing a folder
    Enable { name: String },
    /// Stop synchronizing a folder
    Disable { name: String },
}
