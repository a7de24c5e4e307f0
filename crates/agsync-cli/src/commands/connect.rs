//! connect, init and disconnect

use std::path::PathBuf;

use agsync_core::{InitReport, PasswordCheck, SyncOutcome};
use colored::Colorize;

use crate::context::Engine;
use crate::error::Result;

/// Inputs of `agsync connect`.
#[derive(Debug, Clone, Default)]
pub struct ConnectArgs {
    pub url: String,
    pub token: String,
    pub password: Option<String>,
    pub local_path: Option<PathBuf>,
    pub repository_path: Option<PathBuf>,
    pub device: Option<String>,
}

pub fn run_connect(engine: &Engine, args: ConnectArgs) -> Result<()> {
    let mut config = engine.load_config()?;
    if let Some(path) = args.local_path {
        config.local_path = path;
    }
    if let Some(path) = args.repository_path {
        config.repository_path = path;
    }
    if let Some(device) = args.device {
        config.device_name = device;
    }
    config.validate()?;
    engine.save_config(&config)?;

    println!("{} Connecting to {}...", "=>".blue().bold(), args.url.cyan());
    let outcome = engine
        .orchestrator()
        .connect(&args.url, &args.token, args.password.as_deref())?;
    print_init(outcome);
    println!("{}:   {}", "Config".dimmed(), engine.config_path().display());
    Ok(())
}

pub fn run_init(engine: &Engine) -> Result<()> {
    println!("{} Initialising sync repository...", "=>".blue().bold());
    let outcome = engine.orchestrator().initialize()?;
    print_init(outcome);
    Ok(())
}

fn print_init(outcome: SyncOutcome<InitReport>) {
    let report = match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped(reason) => {
            println!("{} Skipped: {}", "SKIP".yellow().bold(), reason);
            return;
        }
    };
    let origin = if report.cloned { "cloned" } else { "opened" };
    println!("{} Repository {}.", "OK".green().bold(), origin);
    if let Some(inbound) = report.inbound {
        println!("   {} {} file(s) brought in", "+".green(), inbound.copied);
    }
    println!("   {} {} local file(s) recorded", "+".green(), report.outbound.copied);
    match report.password {
        Some(PasswordCheck::Verified) => println!("   {} sync password verified", "+".green()),
        Some(PasswordCheck::Established) => println!("   {} sync password set for this repository", "+".green()),
        None => {}
    }
}

pub fn run_disconnect(engine: &Engine) -> Result<()> {
    engine.orchestrator().disconnect()?;
    println!("{} Disconnected. Local files were left in place.", "OK".green().bold());
    Ok(())
}
