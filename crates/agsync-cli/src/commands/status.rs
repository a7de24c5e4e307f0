//! Status command implementation

use std::time::Duration;

use agsync_core::{SyncState, SyncStatus};
use colored::Colorize;

use crate::context::Engine;
use crate::error::Result;

pub fn run_status(engine: &Engine, detailed: bool, json: bool) -> Result<()> {
    let orchestrator = engine.orchestrator();

    if detailed {
        let details = orchestrator.get_detailed_status()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&details)?);
            return Ok(());
        }
        print_status(&details.status);
        if !details.preview.is_empty() {
            println!();
            println!("{}:", "Pending".bold());
            for path in &details.preview {
                println!("  {} {}", "~".yellow(), path);
            }
            let hidden = details.status.pending_changes.saturating_sub(details.preview.len());
            if hidden > 0 {
                println!("  {} and {} more", "...".dimmed(), hidden);
            }
        }
        if details.conflict_artifacts > 0 {
            println!();
            println!(
                "{} {} conflict artifact(s) kept for review",
                "!".yellow(),
                details.conflict_artifacts
            );
        }
        if !details.recent_commits.is_empty() {
            println!();
            println!("{}:", "Recent commits".bold());
            for commit in &details.recent_commits {
                println!(
                    "  {} {} {}",
                    commit.hash.cyan(),
                    commit.message,
                    format!("({})", commit.author).dimmed()
                );
            }
        }
        return Ok(());
    }

    let status = orchestrator.get_status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold());
    println!();

    if !status.configured {
        println!("{}", "Not connected".red().bold());
        println!();
        println!("Run {} to connect a repository.", "agsync connect".cyan());
        return;
    }

    println!("{}:    {}", "State".dimmed(), colour_state(status.state));
    println!("{}:  {}", "Pending".dimmed(), status.pending_changes);
    println!("{}:    {}", "Ahead".dimmed(), status.ahead);
    println!("{}:   {}", "Behind".dimmed(), status.behind);
    match status.last_sync {
        Some(at) => println!("{}: {}", "Last sync".dimmed(), at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("{}: {}", "Last sync".dimmed(), "never (this session)".dimmed()),
    }
    if let Some(next) = status.next_sync_in {
        println!("{}: {}", "Next sync".dimmed(), format_countdown(next));
    }
    if let Some(error) = &status.last_error {
        println!("{}:    {}", "Error".red(), error);
    }
}

fn colour_state(state: SyncState) -> colored::ColoredString {
    let label = state.to_string();
    match state {
        SyncState::Synced => label.green(),
        SyncState::Error => label.red(),
        SyncState::Idle => label.normal(),
        _ => label.yellow(),
    }
}

/// `m:ss` for a countdown.
pub(crate) fn format_countdown(left: Duration) -> String {
    let secs = left.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
