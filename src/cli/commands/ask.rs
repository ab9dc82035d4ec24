//! Ask command implementation.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::engine::Engine;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question to answer
    #[arg(required = true)]
    pub question: Vec<String>,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let question = args.question.join(" ");

    let engine = Engine::new(&config).context("failed to initialize engine")?;
    engine.reconcile().await.context("reconciliation failed")?;

    if verbose {
        let stats = engine.store_stats().await;
        println!(
            "{}",
            console::style(format!("Searching {} chunk(s)...", stats.chunks)).dim()
        );
    }

    let response = engine.answer(&question, &[]).await;
    print!("{}", formatter.format_answer(&response));

    Ok(())
}
