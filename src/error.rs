//! Error types for docask.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding backend: {0}")]
    ConnectionError(String),

    #[error("embedding backend error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // Server errors might be transient (e.g., 503 Service Unavailable)
            EmbeddingError::ServerError(msg) => is_transient_status(msg),
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors related to answer generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to connect to generation backend: {0}")]
    ConnectionError(String),

    #[error("generation backend error: {0}")]
    ServerError(String),

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation timeout")]
    Timeout,
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::ConnectionError(_) | GenerationError::Timeout => true,
            GenerationError::ServerError(msg) => is_transient_status(msg),
            GenerationError::RequestError(e) => e.is_timeout() || e.is_connect(),
            GenerationError::InvalidResponse(_) => false,
        }
    }
}

/// Errors related to vision extraction.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("failed to connect to vision backend: {0}")]
    ConnectionError(String),

    #[error("vision backend error: {0}")]
    ServerError(String),

    #[error("vision request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid vision response: {0}")]
    InvalidResponse(String),

    #[error("image read error: {0}")]
    ImageReadError(String),

    #[error("vision timeout")]
    Timeout,
}

impl Retryable for VisionError {
    fn is_retryable(&self) -> bool {
        match self {
            VisionError::ConnectionError(_) | VisionError::Timeout => true,
            VisionError::ServerError(msg) => is_transient_status(msg),
            VisionError::RequestError(e) => e.is_timeout() || e.is_connect(),
            VisionError::InvalidResponse(_) | VisionError::ImageReadError(_) => false,
        }
    }
}

/// Errors related to the embedded vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("vector dimension mismatch: collection has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("data integrity fault: {0}")]
    Integrity(String),
}

/// Errors related to the processing state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Errors related to ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingestion already running")]
    AlreadyRunning,

    #[error("file read error: {0}")]
    FileReadError(String),

    #[error("extraction error: {0}")]
    ExtractionError(String),

    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vision error: {0}")]
    VisionError(#[from] VisionError),

    #[error("vector store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("state store error: {0}")]
    StateError(#[from] StateError),
}

/// Errors related to query answering.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors related to export packages and merging.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("manifest dimension mismatch: package has {package}, local store has {local}")]
    DimensionMismatch { package: usize, local: usize },

    #[error("store is busy: {0}")]
    Busy(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("vector store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("state store error: {0}")]
    StateError(#[from] StateError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Other(String),
}

fn is_transient_status(msg: &str) -> bool {
    msg.contains("503")
        || msg.contains("502")
        || msg.contains("504")
        || msg.contains("429")
        || msg.to_lowercase().contains("unavailable")
        || msg.to_lowercase().contains("too many requests")
}
