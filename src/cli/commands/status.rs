//! Status command implementation.

use anyhow::{Context, Result};

use crate::cli::output::{StatusInfo, get_formatter};
use crate::engine::Engine;
use crate::models::{Config, OutputFormat};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let engine = Engine::new(&config).context("failed to initialize engine")?;

    let status = StatusInfo {
        data_dir: config.store.data_dir.to_string_lossy().to_string(),
        watched_folders: config
            .store
            .watched_folders
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        embedding_model: config.embedding.model.clone(),
        embedding_dimension: config.embedding.dimension,
        store: engine.store_stats().await,
        ingestion: engine.ingestion_status(),
    };

    print!("{}", formatter.format_status(&status));
    Ok(())
}
