//! Export command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::engine::Engine;
use crate::models::{Config, ExportMode, OutputFormat};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Directory to write the package into
    #[arg(required = true)]
    pub output: PathBuf,

    /// Export only documents processed since --since
    #[arg(long)]
    pub incremental: bool,

    /// Baseline for incremental export (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub since: Option<String>,
}

pub async fn handle_export(args: ExportArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let mode = if args.incremental {
        let since = args
            .since
            .as_deref()
            .context("--incremental requires --since")?;
        ExportMode::Incremental {
            since: parse_since(since)?,
        }
    } else {
        if args.since.is_some() {
            bail!("--since only applies with --incremental");
        }
        ExportMode::Full
    };

    let engine = Engine::new(&config).context("failed to initialize engine")?;
    engine.reconcile().await.context("reconciliation failed")?;

    let summary = engine.export(mode, &args.output).await?;
    print!("{}", formatter.format_export_summary(&summary));
    Ok(())
}

fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid --since value: {value}"))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc())
}
