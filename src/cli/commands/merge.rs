//! Merge command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::engine::Engine;
use crate::error::ExportError;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Package directory produced by `docask export`
    #[arg(required = true)]
    pub package: PathBuf,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub force: bool,
}

pub async fn handle_merge(args: MergeArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if !args.force {
        println!(
            "This will merge '{}' into the local store. Continue? [y/N]",
            args.package.display()
        );
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let engine = Engine::new(&config).context("failed to initialize engine")?;
    engine.reconcile().await.context("reconciliation failed")?;

    match engine.merge(&args.package).await {
        Ok(report) => {
            print!("{}", formatter.format_merge_report(&report));
            Ok(())
        }
        Err(e @ (ExportError::DimensionMismatch { .. } | ExportError::InvalidPackage(_))) => {
            print!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
