mod config;
mod document;
mod package;
mod query;
mod state;

pub use config::{
    AliasEntry, Config, DEFAULT_BACKEND_URL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GENERATION_MODEL, DEFAULT_VISION_MODEL, EmbeddingConfig, GenerationConfig,
    IngestionConfig, QueryConfig, StoreConfig, VisionConfig,
};
pub use document::{ChunkMetadata, Document, DocumentChunk, DocumentKind, StoredChunk};
pub use package::{
    ExportManifest, ExportMode, ExportPackage, ExportSummary, ExportType, IncrementalInfo,
    MANIFEST_VERSION, ManifestStats, MergeReport,
};
pub use query::{
    ChatRole, ChatTurn, EntityTotal, OutputFormat, QueryResponse, ScoredChunk, SourceRef,
};
pub use state::{
    IngestReport, IngestStatus, ProcessingRecord, ProcessingStatus, ReconcileReport, Tombstone,
};
