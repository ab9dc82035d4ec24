//! Portable snapshots of the indexed corpus.
//!
//! A snapshot carries the vector store collection (full, or the documents
//! processed since a baseline), the matching processing records, and an
//! explicit deletion list, under a manifest that pins the embedding
//! backend's identity and dimension. Merging validates the manifest before
//! any mutation and requires exclusive access to the target store.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::models::{
    ExportManifest, ExportMode, ExportPackage, ExportSummary, ExportType, IncrementalInfo,
    MANIFEST_VERSION, ManifestStats, MergeReport, ProcessingRecord, Tombstone,
};
use crate::services::ingest::IngestGate;
use crate::services::state_store::ProcessingStateStore;
use crate::services::vector_store::VectorStore;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const RECORDS_FILE: &str = "records.json";

/// On-disk companion to `chunks.json`: processing records, tombstones, and
/// the flattened chunk-id deletion list.
#[derive(Debug, Serialize, Deserialize)]
struct RecordsFile {
    records: Vec<ProcessingRecord>,
    #[serde(default)]
    tombstones: Vec<Tombstone>,
    #[serde(default)]
    deletions: Vec<String>,
}

pub struct ExportManager {
    store: Arc<VectorStore>,
    state: Arc<ProcessingStateStore>,
    gate: Arc<IngestGate>,
    embedding_model: String,
    embedding_dimension: usize,
    vision_model: String,
}

impl ExportManager {
    pub fn new(
        store: Arc<VectorStore>,
        state: Arc<ProcessingStateStore>,
        gate: Arc<IngestGate>,
        embedding_model: String,
        embedding_dimension: usize,
        vision_model: String,
    ) -> Self {
        Self {
            store,
            state,
            gate,
            embedding_model,
            embedding_dimension,
            vision_model,
        }
    }

    /// Build a snapshot package in memory.
    pub async fn snapshot(&self, mode: ExportMode) -> Result<ExportPackage, ExportError> {
        let (export_type, records, tombstones) = match mode {
            ExportMode::Full => (ExportType::Full, self.state.all()?, Vec::new()),
            ExportMode::Incremental { since } => (
                ExportType::Incremental,
                self.state.records_since(since)?,
                self.state.tombstones_since(Some(since))?,
            ),
        };

        let chunks = match mode {
            ExportMode::Full => self.store.all_chunks().await,
            ExportMode::Incremental { .. } => {
                let ids: Vec<String> = records
                    .iter()
                    .flat_map(|r| r.chunk_ids.iter().cloned())
                    .collect();
                self.store.get_many(&ids).await
            }
        };

        let deletions: Vec<String> = tombstones
            .iter()
            .flat_map(|t| t.chunk_ids.iter().cloned())
            .collect();

        let manifest = ExportManifest {
            version: MANIFEST_VERSION.to_string(),
            created_at: Utc::now(),
            export_type,
            embedding_model: self.embedding_model.clone(),
            embedding_dimension: self.embedding_dimension,
            vision_model: self.vision_model.clone(),
            statistics: ManifestStats {
                documents: records.len() as u64,
                chunks: chunks.len() as u64,
            },
            incremental: IncrementalInfo {
                is_incremental: matches!(mode, ExportMode::Incremental { .. }),
                since_timestamp: match mode {
                    ExportMode::Incremental { since } => Some(since),
                    ExportMode::Full => None,
                },
            },
        };

        Ok(ExportPackage {
            manifest,
            chunks,
            records,
            deletions,
            tombstones,
        })
    }

    /// Snapshot and write to a package directory.
    pub async fn export(
        &self,
        mode: ExportMode,
        dir: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let package = self.snapshot(mode).await?;
        write_package(&package, dir)?;

        Ok(ExportSummary {
            package_dir: dir.to_string_lossy().to_string(),
            export_type: package.manifest.export_type,
            documents: package.manifest.statistics.documents,
            chunks: package.manifest.statistics.chunks,
            deletions: package.deletions.len() as u64,
        })
    }

    /// Merge a package into the local store.
    ///
    /// Validation failures reject the package before any mutation. The merge
    /// holds the ingest gate and the store write lock, so no ingestion or
    /// query runs against a half-merged collection.
    pub async fn merge(&self, package: ExportPackage) -> Result<MergeReport, ExportError> {
        let started = Instant::now();

        let manifest_errors = package.manifest.validate();
        if !manifest_errors.is_empty() {
            return Err(ExportError::InvalidPackage(manifest_errors.join("; ")));
        }

        // An empty local collection accepts any dimension
        if let Some(local) = self.store.dimension().await
            && local != package.manifest.embedding_dimension
        {
            return Err(ExportError::DimensionMismatch {
                package: package.manifest.embedding_dimension,
                local,
            });
        }

        let _guard = self
            .gate
            .try_begin()
            .ok_or_else(|| ExportError::Busy("ingestion is running".to_string()))?;

        let mut report = MergeReport::default();

        match package.manifest.export_type {
            ExportType::Incremental => {
                let (merged, updated, deleted) = self
                    .store
                    .apply_merge(package.chunks, &package.deletions)
                    .await?;
                report.merged_chunks = merged;
                report.updated_chunks = updated;
                report.deleted_chunks = deleted;
                report.updated_records = self.state.merge_records(&package.records)?;
                self.state.apply_tombstones(&package.tombstones)?;
            }
            ExportType::Full => {
                report.merged_chunks = package.chunks.len() as u64;
                self.store.replace_collection(package.chunks).await?;
                report.updated_records = package.records.len() as u64;
                self.state.replace_all(&package.records)?;
            }
        }

        report.merge_time_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Read a package directory and merge it.
    pub async fn merge_dir(&self, dir: &Path) -> Result<MergeReport, ExportError> {
        let package = read_package(dir)?;
        self.merge(package).await
    }
}

/// Write a package as a directory of JSON files.
pub fn write_package(package: &ExportPackage, dir: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir)?;

    std::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&package.manifest)?,
    )?;
    std::fs::write(
        dir.join(CHUNKS_FILE),
        serde_json::to_string(&package.chunks)?,
    )?;
    let records = RecordsFile {
        records: package.records.clone(),
        tombstones: package.tombstones.clone(),
        deletions: package.deletions.clone(),
    };
    std::fs::write(dir.join(RECORDS_FILE), serde_json::to_string(&records)?)?;

    Ok(())
}

/// Load a package directory. Structural problems surface as
/// `InvalidPackage` before any merge work begins.
pub fn read_package(dir: &Path) -> Result<ExportPackage, ExportError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(ExportError::InvalidPackage(format!(
            "manifest not found in {}",
            dir.display()
        )));
    }

    let manifest: ExportManifest = serde_json::from_str(&std::fs::read_to_string(manifest_path)?)
        .map_err(|e| ExportError::InvalidPackage(format!("malformed manifest: {e}")))?;

    let chunks = serde_json::from_str(&std::fs::read_to_string(dir.join(CHUNKS_FILE))?)
        .map_err(|e| ExportError::InvalidPackage(format!("malformed chunks file: {e}")))?;

    let records: RecordsFile = serde_json::from_str(&std::fs::read_to_string(dir.join(RECORDS_FILE))?)
        .map_err(|e| ExportError::InvalidPackage(format!("malformed records file: {e}")))?;

    Ok(ExportPackage {
        manifest,
        chunks,
        records: records.records,
        deletions: records.deletions,
        tombstones: records.tombstones,
    })
}
