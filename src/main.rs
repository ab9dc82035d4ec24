use anyhow::Result;
use clap::Parser;
use tokio::signal;

use docask::cli::commands::{
    handle_ask, handle_config, handle_export, handle_ingest, handle_merge, handle_status,
};
use docask::cli::{Cli, Commands};
use docask::models::OutputFormat;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli.command, format, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Ingest(args) => {
            handle_ingest(args, format, verbose).await?;
        }
        Commands::Ask(args) => {
            handle_ask(args, format, verbose).await?;
        }
        Commands::Status => {
            handle_status(format, verbose).await?;
        }
        Commands::Export(args) => {
            handle_export(args, format, verbose).await?;
        }
        Commands::Merge(args) => {
            handle_merge(args, format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
