mod chunker;
mod embedding;
mod export;
mod generation;
mod ingest;
pub mod normalize;
mod query_engine;
mod state_store;
mod vector_store;
mod vision;

pub use chunker::TextChunker;
pub use embedding::{EmbeddingBackend, HttpEmbeddingClient};
pub use export::{ExportManager, read_package, write_package};
pub use generation::{GenerationBackend, HttpGenerationClient, build_prompt};
pub use ingest::{
    IngestCoordinator, IngestGate, IngestGuard, PlainTextExtractor, TextExtractor,
};
pub use normalize::{AliasTable, EntityMatch, EntityNormalizer, contains_hangul};
pub use query_engine::QueryEngine;
pub use state_store::ProcessingStateStore;
pub use vector_store::{MetadataFilter, StoreStats, ValueMatch, VectorStore, cosine_similarity};
pub use vision::{
    ExtractionStatus, HttpVisionClient, VisionExtraction, VisionExtractor, parse_extraction,
};
