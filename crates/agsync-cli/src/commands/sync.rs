//! sync, push and pull

use agsync_core::{SyncOutcome, SyncReport};
use colored::Colorize;

use crate::context::Engine;
use crate::error::Result;

pub fn run_sync(engine: &Engine) -> Result<()> {
    println!("{} Syncing...", "=>".blue().bold());
    print_outcome(engine.orchestrator().sync()?);
    Ok(())
}

pub fn run_push(engine: &Engine) -> Result<()> {
    println!("{} Pushing...", "=>".blue().bold());
    print_outcome(engine.orchestrator().push()?);
    Ok(())
}

pub fn run_pull(engine: &Engine) -> Result<()> {
    println!("{} Pulling...", "=>".blue().bold());
    print_outcome(engine.orchestrator().pull()?);
    Ok(())
}

fn print_outcome(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => print_report(&report),
        SyncOutcome::Skipped(reason) => println!("{} Skipped: {}", "SKIP".yellow().bold(), reason),
    }
}

fn print_report(report: &SyncReport) {
    let inbound = &report.inbound;
    println!(
        "   {} {} sent, {} received, {} removed",
        "+".green(),
        report.outbound.copied,
        inbound.copied,
        inbound.deleted
    );
    if inbound.skipped_local_newer > 0 {
        println!(
            "   {} {} file(s) kept because the local copy is newer",
            "!".yellow(),
            inbound.skipped_local_newer
        );
    }
    if let Some(merge) = &report.merge {
        println!(
            "   {} Smart Merge: {} kept local, {} took remote",
            "!".yellow(),
            merge.kept_local,
            merge.took_remote
        );
        for artifact in &merge.artifacts {
            println!("     {} {}", "-".dimmed(), artifact.display());
        }
    }
    match &report.pushed {
        Some(commit) => println!("{} Published {}.", "OK".green().bold(), commit.cyan()),
        None => println!("{} Up to date.", "OK".green().bold()),
    }
}
