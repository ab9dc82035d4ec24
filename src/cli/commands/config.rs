//! Config command implementation.

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the active configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Show => {
            let config = Config::load()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                OutputFormat::Text => {
                    println!("{}", toml::to_string_pretty(&config)?);
                }
            }
        }
        ConfigCommand::Init { force } => {
            if let Some(path) = Config::config_path()
                && path.exists()
                && !force
            {
                println!(
                    "{}",
                    formatter.format_error(&format!(
                        "config already exists at {} (use --force to overwrite)",
                        path.display()
                    ))
                );
                return Ok(());
            }
            let config = Config::default();
            config.save()?;
            if let Some(path) = Config::config_path() {
                println!(
                    "{}",
                    formatter.format_message(&format!("Wrote {}", path.display()))
                );
            }
        }
        ConfigCommand::Path => match Config::config_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", formatter.format_error("no config directory available")),
        },
    }

    Ok(())
}
