//! Engine facade.
//!
//! Owns the stores and backends and exposes the operation surface consumed
//! by the CLI layer: start_ingestion, ingestion_status, answer, export,
//! merge, and reconcile. Call [`Engine::reconcile`] once at startup before
//! other operations; it repairs any inconsistency left by an interrupted
//! commit.

use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, ExportError, IngestError};
use crate::models::{
    ChatTurn, Config, ExportMode, ExportSummary, IngestReport, IngestStatus, MergeReport,
    QueryResponse, ReconcileReport,
};
use crate::services::{
    EmbeddingBackend, EntityNormalizer, ExportManager, GenerationBackend, HttpEmbeddingClient,
    HttpGenerationClient, HttpVisionClient, IngestCoordinator, IngestGate, PlainTextExtractor,
    ProcessingStateStore, QueryEngine, StoreStats, TextExtractor, VectorStore, VisionExtractor,
};
use crate::services::normalize::AliasTable;

pub struct Engine {
    store: Arc<VectorStore>,
    coordinator: IngestCoordinator,
    query: QueryEngine,
    exporter: ExportManager,
}

impl Engine {
    /// Build an engine with the HTTP backends from configuration.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(
            HttpEmbeddingClient::new(&config.embedding)
                .map_err(|e| AppError::Other(e.to_string()))?,
        );
        let generator: Arc<dyn GenerationBackend> = Arc::new(
            HttpGenerationClient::new(&config.generation)
                .map_err(|e| AppError::Other(e.to_string()))?,
        );
        let vision: Arc<dyn VisionExtractor> = Arc::new(
            HttpVisionClient::new(&config.vision).map_err(|e| AppError::Other(e.to_string()))?,
        );
        let extractor: Arc<dyn TextExtractor> =
            Arc::new(PlainTextExtractor::new(config.ingestion.max_file_size));

        Self::with_backends(config, embedder, generator, vision, extractor)
    }

    /// Build an engine with caller-supplied backends. This is the seam the
    /// tests use to run without network access.
    pub fn with_backends(
        config: &Config,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
        vision: Arc<dyn VisionExtractor>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self, AppError> {
        let store = Arc::new(VectorStore::open(&config.store.data_dir)?);
        let state = Arc::new(ProcessingStateStore::open(&config.store.data_dir)?);
        let gate = Arc::new(IngestGate::new());

        let mut aliases = AliasTable::with_defaults();
        aliases.extend_from(&config.aliases);

        let coordinator = IngestCoordinator::new(
            store.clone(),
            state.clone(),
            embedder.clone(),
            vision.clone(),
            extractor,
            config.ingestion.clone(),
            config.store.watched_folders.clone(),
            gate.clone(),
        );

        let query = QueryEngine::new(
            store.clone(),
            embedder.clone(),
            generator,
            EntityNormalizer::new(aliases),
            config.query.clone(),
        );

        let exporter = ExportManager::new(
            store.clone(),
            state,
            gate,
            embedder.model_name().to_string(),
            embedder.dimension(),
            vision.model_name().to_string(),
        );

        Ok(Self {
            store,
            coordinator,
            query,
            exporter,
        })
    }

    /// Run one scan-and-diff ingestion cycle. Rejected while another run or
    /// a merge is active.
    pub async fn start_ingestion(&self) -> Result<IngestReport, IngestError> {
        self.coordinator.run().await
    }

    /// Like [`start_ingestion`](Self::start_ingestion), reporting
    /// `(done, total)` progress per file.
    pub async fn start_ingestion_with_progress<F>(
        &self,
        progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(u64, u64),
    {
        self.coordinator.run_with(progress).await
    }

    pub fn ingestion_status(&self) -> IngestStatus {
        self.coordinator.status()
    }

    /// Answer a question. Degrades to template answers rather than failing.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> QueryResponse {
        self.query.answer(question, history).await
    }

    pub async fn export(&self, mode: ExportMode, dir: &Path) -> Result<ExportSummary, ExportError> {
        self.exporter.export(mode, dir).await
    }

    pub async fn merge(&self, package_dir: &Path) -> Result<MergeReport, ExportError> {
        self.exporter.merge_dir(package_dir).await
    }

    /// Startup reconciliation: remove chunks unreferenced by processed
    /// records and fail interrupted records.
    pub async fn reconcile(&self) -> Result<ReconcileReport, IngestError> {
        self.coordinator.reconcile().await
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.stats().await
    }
}
