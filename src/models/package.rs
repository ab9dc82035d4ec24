use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::StoredChunk;
use super::state::{ProcessingRecord, Tombstone};

pub const MANIFEST_VERSION: &str = "1.0";

/// What a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    Full,
    Incremental,
}

impl std::fmt::Display for ExportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportType::Full => write!(f, "full"),
            ExportType::Incremental => write!(f, "incremental"),
        }
    }
}

/// Snapshot mode requested by the caller.
#[derive(Debug, Clone, Copy)]
pub enum ExportMode {
    Full,
    Incremental { since: DateTime<Utc> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestStats {
    pub documents: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalInfo {
    pub is_incremental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_timestamp: Option<DateTime<Utc>>,
}

/// Compatibility descriptor accompanying an exported package.
///
/// A merge target rejects any manifest whose embedding dimension differs
/// from its own, before touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub export_type: ExportType,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub vision_model: String,
    pub statistics: ManifestStats,
    pub incremental: IncrementalInfo,
}

impl ExportManifest {
    /// Structural validation; returns every problem found rather than the
    /// first one.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.version.is_empty() {
            errors.push("manifest missing version".to_string());
        }
        if self.embedding_model.is_empty() {
            errors.push("manifest missing embedding_model".to_string());
        }
        if self.embedding_dimension == 0 {
            errors.push("manifest embedding_dimension must be positive".to_string());
        }
        match self.export_type {
            ExportType::Incremental if !self.incremental.is_incremental => {
                errors.push(
                    "export_type is incremental but is_incremental is false".to_string(),
                );
            }
            ExportType::Full if self.incremental.is_incremental => {
                errors.push("export_type is full but is_incremental is true".to_string());
            }
            _ => {}
        }
        if self.incremental.is_incremental && self.incremental.since_timestamp.is_none() {
            errors.push("incremental export missing since_timestamp".to_string());
        }

        errors
    }
}

/// A portable snapshot: manifest + chunk payload + processing records +
/// the chunk ids deleted since the incremental baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPackage {
    pub manifest: ExportManifest,
    pub chunks: Vec<StoredChunk>,
    pub records: Vec<ProcessingRecord>,
    #[serde(default)]
    pub deletions: Vec<String>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

/// Result of writing a snapshot to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub package_dir: String,
    pub export_type: ExportType,
    pub documents: u64,
    pub chunks: u64,
    pub deletions: u64,
}

/// Result of merging a package into the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeReport {
    pub merged_chunks: u64,
    pub updated_chunks: u64,
    pub deleted_chunks: u64,
    pub updated_records: u64,
    pub errors: Vec<String>,
    pub merge_time_ms: u64,
}
