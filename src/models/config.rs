use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "qwen3-embedding";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;
pub const DEFAULT_GENERATION_MODEL: &str = "qwen2.5:7b";
pub const DEFAULT_VISION_MODEL: &str = "qwen2.5vl:7b";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Merchant alias entries merged into the built-in alias table.
    #[serde(default, rename = "aliases")]
    pub aliases: Vec<AliasEntry>,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docask").join("config.toml"))
    }

    pub fn load() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// Where the collection and processing state live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Folders scanned for documents.
    #[serde(default)]
    pub watched_folders: Vec<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docask")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            watched_folders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    8
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_generation_timeout() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

/// Vision calls are the heaviest backend calls and get the longest timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_vision_timeout() -> u64 {
    120
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            model: default_vision_model(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Chunk window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.DS_Store".to_string(),
        "**/Thumbs.db".to_string(),
    ]
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size: default_max_file_size(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Results below this similarity are never used as evidence or cited.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f32,
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_floor() -> f32 {
    0.5
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_floor: default_similarity_floor(),
        }
    }
}

/// One canonical entity plus the localized names that resolve to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    pub names: Vec<String>,
}
