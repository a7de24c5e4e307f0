//! Antigravity Sync CLI
//!
//! Connects a working directory to a sync repository and runs sync, push,
//! pull and status from the command line, or keeps syncing with `watch`.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::{Engine, Paths};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        println!("{} Antigravity Sync", "agsync".green().bold());
        println!();
        println!("Run {} for available commands.", "agsync --help".cyan());
        return Ok(());
    };

    let engine = Engine::open(&Paths {
        config: cli.config,
        credentials: cli.credentials,
    })?;
    execute_command(&engine, command)
}

/// `RUST_LOG` wins; otherwise warnings, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("Verbose mode enabled");
}

fn execute_command(engine: &Engine, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Connect {
            url,
            token,
            password,
            local_path,
            repository_path,
            device,
        } => commands::run_connect(
            engine,
            commands::ConnectArgs {
                url,
                token,
                password,
                local_path,
                repository_path,
                device,
            },
        ),
        Commands::Init => commands::run_init(engine),
        Commands::Sync => commands::run_sync(engine),
        Commands::Push => commands::run_push(engine),
        Commands::Pull => commands::run_pull(engine),
        Commands::Status { detailed, json } => commands::run_status(engine, detailed, json),
        Commands::ResetPassword { password, token } => commands::run_reset_password(engine, &password, &token),
        Commands::Watch => commands::run_watch(engine),
        Commands::Folder { action } => commands::run_folder(engine, action),
        Commands::Disconnect => commands::run_disconnect(engine),
    }
}
