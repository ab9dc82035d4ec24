//! CLI module for docask.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Local document Q&A with incremental indexing and portable index sync.
#[derive(Debug, Parser)]
#[command(name = "docask")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text or json"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan watched folders and index new or modified documents
    Ingest(commands::IngestArgs),

    /// Ask a question over the indexed documents
    Ask(commands::AskArgs),

    /// Show store contents and ingestion state
    Status,

    /// Export the indexed corpus as a portable package
    Export(commands::ExportArgs),

    /// Merge an exported package into the local store
    Merge(commands::MergeArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
