use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::DocumentKind;

/// Lifecycle of one document in the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Unprocessed,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Unprocessed => "unprocessed",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(ProcessingStatus::Unprocessed),
            "processing" => Ok(ProcessingStatus::Processing),
            "processed" => Ok(ProcessingStatus::Processed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(format!("unknown processing status: {}", s)),
        }
    }
}

/// Per-document bookkeeping: hash, status, and the exact chunk ids the
/// document currently owns in the vector store.
///
/// Invariant: when `status == Processed`, the store's chunk set for this
/// document equals `chunk_ids` exactly. The reconcile pass repairs any
/// divergence left by an interrupted commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub path: String,
    pub hash: String,
    pub status: ProcessingStatus,
    pub kind: DocumentKind,
    pub chunk_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Record of a document whose source disappeared; its chunk ids feed the
/// deletion list of incremental exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    pub path: String,
    pub chunk_ids: Vec<String>,
    pub removed_at: DateTime<Utc>,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub removed: u64,
    pub chunks_written: u64,
    /// (path, error message) for every failed file.
    pub failed_files: Vec<(String, String)>,
    pub duration_ms: u64,
}

/// Queryable ingestion state: the busy flag plus the last completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStatus {
    pub busy: bool,
    pub last_report: Option<IngestReport>,
}

/// Result of the startup reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Chunks deleted because no processed record references them.
    pub orphan_chunks_removed: u64,
    /// Records found mid-commit and downgraded to failed.
    pub interrupted_records: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ProcessingStatus::Unprocessed,
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Failed,
        ] {
            let parsed: ProcessingStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<ProcessingStatus>().is_err());
    }
}
