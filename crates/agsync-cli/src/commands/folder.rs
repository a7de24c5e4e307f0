//! folder list/enable/disable

use colored::Colorize;

use crate::cli::FolderAction;
use crate::context::Engine;
use crate::error::Result;

pub fn run_folder(engine: &Engine, action: FolderAction) -> Result<()> {
    let mut config = engine.load_config()?;
    match action {
        FolderAction::List => {
            println!("{}:", "Synchronized folders".bold());
            if config.folders.is_empty() {
                println!("  {} (use {} to add)", "None".dimmed(), "agsync folder enable".cyan());
            }
            for folder in &config.folders {
                let present = config.local_path.join(folder).is_dir();
                let note = if present { "".normal() } else { " (missing locally)".dimmed() };
                println!("  {} {}{}", "+".green(), folder.cyan(), note);
            }
            return Ok(());
        }
        FolderAction::Enable { name } => {
            config.set_folder_enabled(&name, true)?;
            println!("{} Now syncing {}", "OK".green().bold(), name.cyan());
        }
        FolderAction::Disable { name } => {
            config.set_folder_enabled(&name, false)?;
            println!("{} No longer syncing {}", "OK".green().bold(), name.cyan());
        }
    }
    engine.save_config(&config)
}
