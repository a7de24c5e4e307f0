//! watch: run automatic sync in the foreground until interrupted

use agsync_core::{Severity, SyncEvent};
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use crate::context::Engine;
use crate::error::{CliError, Result};

pub fn run_watch(engine: &Engine) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(watch(engine))
}

async fn watch(engine: &Engine) -> Result<()> {
    let orchestrator = engine.orchestrator();
    let mut events = orchestrator.events().subscribe();

    if !orchestrator.start_auto_sync()? {
        return Err(CliError::user(
            "automatic sync is disabled; set `enabled` and `auto_sync` in the configuration",
        ));
    }
    let config = engine.load_config()?;
    println!(
        "{} Watching {} (every {} min, {}s after edits). Press Ctrl-C to stop.",
        "=>".blue().bold(),
        config.local_path.display().to_string().cyan(),
        config.sync_interval_minutes,
        config.debounce_seconds
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => tracing::debug!(missed, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.stop_auto_sync();
    println!("{} Stopped.", "OK".green().bold());
    Ok(())
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::StateChanged(state) => tracing::debug!(state = %state, "State changed"),
        SyncEvent::Log { message, severity } => match severity {
            Severity::Info => println!("   {} {}", "-".dimmed(), message),
            Severity::Warning => println!("   {} {}", "!".yellow(), message),
            Severity::Error => println!("   {} {}", "x".red().bold(), message),
        },
        SyncEvent::PullCompleted(stats) if stats.copied + stats.deleted > 0 => {
            println!("   {} {} received, {} removed", "+".green(), stats.copied, stats.deleted);
        }
        SyncEvent::PullCompleted(_) => {}
        SyncEvent::Pushed { commit } => println!("   {} published {}", "+".green(), commit.cyan()),
        SyncEvent::Skipped(reason) => println!("   {} skipped: {}", "-".dimmed(), reason),
        SyncEvent::Countdown(_) => {}
    }
}
