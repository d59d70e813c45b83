use anyhow::Result;
use colored::Colorize;

use crate::app::{init_config, Config};

use super::Commands;

/// Handle CLI subcommands that don't need a model connection
///
/// Returns `true` when the command was fully handled.
pub fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Init => {
            let (path, created) = init_config()?;
            if created {
                println!("Created default configuration at: {}", path.display());
            } else {
                println!("Configuration already exists at: {}", path.display());
            }
            Ok(true)
        }
        Commands::Models => {
            list_models(config)?;
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
        Commands::Chat | Commands::Serve { .. } => Ok(false),
    }
}

/// List the configured model catalog
pub fn list_models(config: &Config) -> Result<()> {
    let catalog = config.catalog()?;
    let default_id = catalog
        .resolve(&config.default_model)
        .map(|m| m.id.clone())
        .unwrap_or_default();

    println!("Available models:");
    for (key, model) in catalog.iter() {
        let marker = if model.id == default_id { " (default)" } else { "" };
        println!("  {}. {} [{}]{}", key, model.name, model.id.green(), marker);
    }
    Ok(())
}

/// Show version information
pub fn show_version() {
    println!("gemini-chat v{}", env!("CARGO_PKG_VERSION"));
    println!("   A minimal terminal and HTTP chat front-end for Gemini");
}
