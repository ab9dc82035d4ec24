//! Query request/response models.

use serde::{Deserialize, Serialize};

use super::document::ChunkMetadata;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// One turn of conversation history handed to the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
}

/// A cited source. Only chunks at or above the relevance floor are ever
/// attributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub filename: String,
    pub similarity: f32,
    pub snippet: String,
}

/// Per-entity aggregation result; sums are never mixed across entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTotal {
    pub entity: String,
    pub total: f64,
    pub count: u64,
}

/// Complete answer to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub totals: Vec<EntityTotal>,
    pub retrieval_ms: u64,
}
