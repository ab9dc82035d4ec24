//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::get_formatter;
use crate::engine::Engine;
use crate::error::IngestError;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Skip the startup reconciliation pass
    #[arg(long)]
    pub no_reconcile: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if config.store.watched_folders.is_empty() {
        println!(
            "{}",
            formatter.format_message(
                "No watched folders configured. Add folders under [store] in the config file."
            )
        );
        return Ok(());
    }

    let engine = Engine::new(&config).context("failed to initialize engine")?;

    if !args.no_reconcile {
        let report = engine.reconcile().await.context("reconciliation failed")?;
        if verbose && (report.orphan_chunks_removed > 0 || report.interrupted_records > 0) {
            println!(
                "{}",
                console::style(format!(
                    "Reconciled store: {} orphan chunk(s) removed, {} interrupted record(s)",
                    report.orphan_chunks_removed, report.interrupted_records
                ))
                .yellow()
            );
        }
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let result = engine
        .start_ingestion_with_progress(|done, total| {
            pb.set_length(total);
            pb.set_position(done);
        })
        .await;
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            print!("{}", formatter.format_ingest_report(&report));
            Ok(())
        }
        Err(IngestError::AlreadyRunning) => {
            print!(
                "{}",
                formatter.format_error("an ingestion run is already active")
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
