//! reset-password

use agsync_core::SyncOutcome;
use colored::Colorize;

use crate::context::Engine;
use crate::error::{CliError, Result};

pub fn run_reset_password(engine: &Engine, password: &str, token: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(CliError::user("the new password must not be empty"));
    }
    match engine.orchestrator().reset_password(password, token)? {
        SyncOutcome::Completed(()) => {
            println!("{} Sync password replaced and published.", "OK".green().bold());
            println!("Other devices must reconnect with the new password.");
        }
        SyncOutcome::Skipped(reason) => {
            println!("{} Not changed: {}", "SKIP".yellow().bold(), reason);
        }
    }
    Ok(())
}
