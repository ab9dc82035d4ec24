//! Ingestion pipeline orchestration.
//!
//! Scans watched folders, diffs file hashes against the processing state,
//! and drives chunking, embedding, and storage for new or modified
//! documents. Each document commits in two phases: the new chunk set is
//! produced and embedded fully in memory first, and only then are the old
//! chunks deleted and the new ones upserted. A failure before the delete
//! leaves no mutation; an interruption between delete and record update is
//! repaired by `reconcile`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::models::{
    ChunkMetadata, Document, DocumentChunk, DocumentKind, IngestReport, IngestStatus,
    IngestionConfig, ProcessingRecord, ProcessingStatus, ReconcileReport, StoredChunk,
};
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingBackend;
use crate::services::vector_store::VectorStore;
use crate::services::vision::{ExtractionStatus, VisionExtractor};
use crate::services::state_store::ProcessingStateStore;
use crate::utils::file::{file_hash, is_image_file, is_text_file, read_text_content};

/// Replaceable text extraction collaborator: `file -> plain text`.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, IngestError>;
}

/// Default extractor: UTF-8 file read with a size cap.
pub struct PlainTextExtractor {
    max_file_size: u64,
}

impl PlainTextExtractor {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, IngestError> {
        read_text_content(path, self.max_file_size)
            .map_err(|e| IngestError::FileReadError(format!("{}: {}", path.display(), e)))
    }
}

/// Owned mutual-exclusion flag for ingestion.
///
/// Concurrent run requests are rejected, not queued; the busy state is
/// queryable by callers. Merging also acquires this gate, since merge
/// requires exclusive access to the store.
#[derive(Debug, Default)]
pub struct IngestGate {
    busy: AtomicBool,
}

impl IngestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate, or None if a run is already active.
    pub fn try_begin(&self) -> Option<IngestGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(IngestGuard { gate: self })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct IngestGuard<'a> {
    gate: &'a IngestGate,
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

enum FileOutcome {
    Processed { chunks: u64 },
    Skipped,
    Failed(String),
}

/// Drives the per-document state machine
/// `Unseen -> Processing -> {Processed, Failed}` for every discovered file.
pub struct IngestCoordinator {
    store: Arc<VectorStore>,
    state: Arc<ProcessingStateStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    vision: Arc<dyn VisionExtractor>,
    extractor: Arc<dyn TextExtractor>,
    chunker: TextChunker,
    config: IngestionConfig,
    folders: Vec<PathBuf>,
    gate: Arc<IngestGate>,
    last_report: Mutex<Option<IngestReport>>,
}

impl IngestCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<VectorStore>,
        state: Arc<ProcessingStateStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        vision: Arc<dyn VisionExtractor>,
        extractor: Arc<dyn TextExtractor>,
        config: IngestionConfig,
        folders: Vec<PathBuf>,
        gate: Arc<IngestGate>,
    ) -> Self {
        Self {
            store,
            state,
            embedder,
            vision,
            extractor,
            chunker: TextChunker::new(&config),
            config,
            folders,
            gate,
            last_report: Mutex::new(None),
        }
    }

    pub fn gate(&self) -> &IngestGate {
        &self.gate
    }

    /// The busy flag plus the last completed run.
    pub fn status(&self) -> IngestStatus {
        IngestStatus {
            busy: self.gate.is_busy(),
            last_report: self.last_report.lock().expect("report lock poisoned").clone(),
        }
    }

    /// Run one scan-and-diff cycle. Rejected with `AlreadyRunning` while
    /// another run (or a merge) holds the gate.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        self.run_with(|_, _| {}).await
    }

    /// Like [`run`](Self::run), reporting `(done, total)` after each file.
    pub async fn run_with<F>(&self, mut progress: F) -> Result<IngestReport, IngestError>
    where
        F: FnMut(u64, u64),
    {
        let _guard = self.gate.try_begin().ok_or(IngestError::AlreadyRunning)?;
        let started = Instant::now();

        let files = self.scan_files()?;
        let total = files.len() as u64;
        let mut report = IngestReport::default();

        for (done, (path, kind)) in files.iter().enumerate() {
            match self.process_file(path, *kind).await {
                FileOutcome::Processed { chunks } => {
                    report.processed += 1;
                    report.chunks_written += chunks;
                }
                FileOutcome::Skipped => report.skipped += 1,
                FileOutcome::Failed(error) => {
                    report.failed += 1;
                    report
                        .failed_files
                        .push((path.to_string_lossy().to_string(), error));
                }
            }
            progress(done as u64 + 1, total);
        }

        report.removed = self.remove_missing_sources(&files).await?;
        report.duration_ms = started.elapsed().as_millis() as u64;

        *self.last_report.lock().expect("report lock poisoned") = Some(report.clone());
        Ok(report)
    }

    /// Startup reconciliation: delete chunks no processed record references,
    /// and fail records left mid-commit so the next scan reprocesses them.
    pub async fn reconcile(&self) -> Result<ReconcileReport, IngestError> {
        let mut report = ReconcileReport::default();

        let mut referenced: HashSet<String> = HashSet::new();
        for record in self.state.all()? {
            match record.status {
                ProcessingStatus::Processed => referenced.extend(record.chunk_ids),
                ProcessingStatus::Processing => {
                    let mut failed = record;
                    failed.status = ProcessingStatus::Failed;
                    failed.error = Some("interrupted during commit".to_string());
                    failed.chunk_ids = Vec::new();
                    self.state.upsert(&failed)?;
                    report.interrupted_records += 1;
                }
                _ => {}
            }
        }

        report.orphan_chunks_removed = self.store.delete_not_in(&referenced).await?;
        Ok(report)
    }

    /// Discover ingestable files under the watched folders.
    fn scan_files(&self) -> Result<Vec<(PathBuf, DocumentKind)>, IngestError> {
        let patterns: Vec<glob::Pattern> = self
            .config
            .exclude_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let mut files = Vec::new();
        for folder in &self.folders {
            for entry in WalkDir::new(folder).follow_links(false) {
                let entry = entry
                    .map_err(|e| IngestError::FileReadError(format!("scan failed: {}", e)))?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }

                let path_str = path.to_string_lossy();
                if patterns.iter().any(|p| p.matches(&path_str)) {
                    continue;
                }

                if is_text_file(path) {
                    files.push((path.to_path_buf(), DocumentKind::Text));
                } else if is_image_file(path) {
                    files.push((path.to_path_buf(), DocumentKind::Receipt));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn process_file(&self, path: &Path, kind: DocumentKind) -> FileOutcome {
        let path_str = path.to_string_lossy().to_string();

        let hash = match file_hash(path) {
            Ok(hash) => hash,
            Err(e) => return FileOutcome::Failed(format!("cannot hash file: {e}")),
        };

        let existing = match self.state.get(&path_str) {
            Ok(record) => record,
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        if let Some(ref record) = existing
            && record.status == ProcessingStatus::Processed
            && record.hash == hash
        {
            return FileOutcome::Skipped;
        }

        let old_chunk_ids: Vec<String> = existing.map(|r| r.chunk_ids).unwrap_or_default();
        let document = Document::new(path_str.clone(), kind, hash.clone());

        let mut record = ProcessingRecord {
            path: path_str.clone(),
            hash,
            status: ProcessingStatus::Processing,
            kind,
            chunk_ids: old_chunk_ids.clone(),
            error: None,
            processed_at: Utc::now(),
        };
        if let Err(e) = self.state.upsert(&record) {
            return FileOutcome::Failed(e.to_string());
        }

        // Phase (a): produce and embed the new chunk set fully in memory.
        // Any failure here leaves the store untouched.
        let new_chunks = match self.build_chunks(path, &document).await {
            Ok(Some(chunks)) => chunks,
            Ok(None) => {
                // Nothing extractable; leave prior state for the next scan
                record.status = ProcessingStatus::Unprocessed;
                let _ = self.state.upsert(&record);
                return FileOutcome::Skipped;
            }
            Err(e) => {
                record.status = ProcessingStatus::Failed;
                record.error = Some(e.to_string());
                record.chunk_ids = old_chunk_ids;
                let _ = self.state.upsert(&record);
                return FileOutcome::Failed(e.to_string());
            }
        };

        // Phase (b): delete the old chunk set before committing the new one.
        // Stale chunks coexisting with fresh ones corrupt later retrieval.
        if let Err(e) = self.store.delete(&old_chunk_ids).await {
            record.status = ProcessingStatus::Failed;
            record.error = Some(e.to_string());
            let _ = self.state.upsert(&record);
            return FileOutcome::Failed(e.to_string());
        }

        // Phase (c): upsert the new chunks.
        let chunk_count = new_chunks.len() as u64;
        let new_ids: Vec<String> = new_chunks.iter().map(|c| c.id.clone()).collect();
        if let Err(e) = self.store.upsert(new_chunks).await {
            record.status = ProcessingStatus::Failed;
            record.error = Some(e.to_string());
            record.chunk_ids = Vec::new();
            let _ = self.state.upsert(&record);
            return FileOutcome::Failed(e.to_string());
        }

        // Phase (d): mark processed with the exact committed chunk ids.
        record.status = ProcessingStatus::Processed;
        record.chunk_ids = new_ids;
        record.error = None;
        record.processed_at = Utc::now();
        if let Err(e) = self.state.upsert(&record) {
            return FileOutcome::Failed(e.to_string());
        }

        FileOutcome::Processed {
            chunks: chunk_count,
        }
    }

    /// Extract, chunk, and embed one document entirely in memory.
    /// Returns None when the source has no extractable content.
    async fn build_chunks(
        &self,
        path: &Path,
        document: &Document,
    ) -> Result<Option<Vec<StoredChunk>>, IngestError> {
        let chunks = match document.kind {
            DocumentKind::Text => {
                let text = self.extractor.extract(path).await?;
                let windows = self.chunker.split(&text);
                if windows.is_empty() {
                    return Ok(None);
                }
                windows
                    .into_iter()
                    .enumerate()
                    .map(|(i, window)| {
                        let metadata =
                            ChunkMetadata::for_document(path, DocumentKind::Text, i as u32)
                                .sanitize();
                        DocumentChunk::new(&document.id, window, metadata)
                    })
                    .collect()
            }
            DocumentKind::Receipt => {
                let extraction = self.vision.extract(path).await?;
                if extraction.status == ExtractionStatus::NoContent {
                    return Ok(None);
                }
                let text = extraction.format_as_text();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                // Structured vision output stays one chunk so its metadata
                // fields remain cohesive for aggregation
                let metadata = extraction.into_chunk_metadata(path, DocumentKind::Receipt);
                vec![DocumentChunk::new(&document.id, text, metadata)]
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(IngestError::ExtractionError(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                embeddings.len()
            )));
        }

        Ok(Some(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| StoredChunk::from_chunk(chunk, embedding))
                .collect(),
        ))
    }

    /// Drop documents whose source disappeared, leaving tombstones for
    /// incremental export.
    async fn remove_missing_sources(
        &self,
        discovered: &[(PathBuf, DocumentKind)],
    ) -> Result<u64, IngestError> {
        let present: HashSet<String> = discovered
            .iter()
            .map(|(p, _)| p.to_string_lossy().to_string())
            .collect();

        let mut removed = 0;
        for record in self.state.all()? {
            if present.contains(&record.path) || Path::new(&record.path).exists() {
                continue;
            }
            self.store.delete(&record.chunk_ids).await?;
            self.state.remove(&record.path)?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, VisionError};
    use crate::services::vision::{VisionExtraction, parse_extraction};
    use std::collections::BTreeMap;

    /// Length-keyed embedder: deterministic, no network.
    struct TestEmbedder;

    #[async_trait]
    impl EmbeddingBackend for TestEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| vec![1.0, t.len() as f32 % 7.0])
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "test-embedder"
        }
    }

    /// Fails any batch containing the marker text.
    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FailingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.iter().any(|t| t.contains("FAILME")) {
                return Err(EmbeddingError::Timeout);
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing-test-embedder"
        }
    }

    struct TestVision;

    #[async_trait]
    impl VisionExtractor for TestVision {
        async fn extract(&self, _image_path: &Path) -> Result<VisionExtraction, VisionError> {
            Ok(parse_extraction(
                "Merchant Name: Costco Wholesale\nDate: 2026-02-11\nTotal Amount: $222.18\n",
            ))
        }

        fn model_name(&self) -> &str {
            "test-vision"
        }
    }

    struct EmptyVision;

    #[async_trait]
    impl VisionExtractor for EmptyVision {
        async fn extract(&self, _image_path: &Path) -> Result<VisionExtraction, VisionError> {
            Ok(VisionExtraction {
                status: ExtractionStatus::NoContent,
                fields: BTreeMap::new(),
                raw_text: String::new(),
            })
        }

        fn model_name(&self) -> &str {
            "empty-test-vision"
        }
    }

    struct Fixture {
        coordinator: IngestCoordinator,
        store: Arc<VectorStore>,
        state: Arc<ProcessingStateStore>,
        _data_dir: tempfile::TempDir,
    }

    fn fixture(
        docs_dir: &Path,
        embedder: Arc<dyn EmbeddingBackend>,
        vision: Arc<dyn VisionExtractor>,
    ) -> Fixture {
        let data_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::create(data_dir.path()).unwrap());
        let state = Arc::new(ProcessingStateStore::open_in_memory().unwrap());
        let config = IngestionConfig::default();

        let coordinator = IngestCoordinator::new(
            store.clone(),
            state.clone(),
            embedder,
            vision,
            Arc::new(PlainTextExtractor::new(config.max_file_size)),
            config,
            vec![docs_dir.to_path_buf()],
            Arc::new(IngestGate::new()),
        );

        Fixture {
            coordinator,
            store,
            state,
            _data_dir: data_dir,
        }
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_first_run_processes_all_files() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "notes.txt", "grocery notes about costco");
        write_file(docs.path(), "receipt.jpeg", "binary-ish");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        let report = f.coordinator.run().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
        assert!(f.store.stats().await.chunks >= 2);

        // Receipt metadata made it into the store intact
        let receipt_path = docs.path().join("receipt.jpeg").to_string_lossy().to_string();
        let record = f.state.get(&receipt_path).unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Processed);
        let chunks = f.store.get_many(&record.chunk_ids).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.store.as_deref(), Some("Costco Wholesale"));
        assert_eq!(chunks[0].metadata.total, Some(222.18));
    }

    #[tokio::test]
    async fn test_unchanged_file_reprocessing_is_noop() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "notes.txt", "stable content");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        f.coordinator.run().await.unwrap();
        let chunks_before = f.store.stats().await.chunks;
        let ids_before = f
            .state
            .get(&docs.path().join("notes.txt").to_string_lossy())
            .unwrap()
            .unwrap()
            .chunk_ids;

        let report = f.coordinator.run().await.unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.chunks_written, 0);
        assert_eq!(f.store.stats().await.chunks, chunks_before);
        let ids_after = f
            .state
            .get(&docs.path().join("notes.txt").to_string_lossy())
            .unwrap()
            .unwrap()
            .chunk_ids;
        assert_eq!(ids_before, ids_after);
    }

    #[tokio::test]
    async fn test_modified_file_replaces_chunk_set() {
        let docs = tempfile::tempdir().unwrap();
        let path = write_file(docs.path(), "notes.txt", &"first version ".repeat(200));
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        f.coordinator.run().await.unwrap();
        let path_str = path.to_string_lossy().to_string();
        let old_ids = f.state.get(&path_str).unwrap().unwrap().chunk_ids;
        assert!(!old_ids.is_empty());

        std::fs::write(&path, "second version, much shorter").unwrap();
        let report = f.coordinator.run().await.unwrap();
        assert_eq!(report.processed, 1);

        let record = f.state.get(&path_str).unwrap().unwrap();
        let document_id = Document::generate_id(&path_str);
        let live_ids: HashSet<String> = f
            .store
            .chunk_ids_for_document(&document_id)
            .await
            .into_iter()
            .collect();

        // Exactly the new chunk set remains; record and store agree
        assert_eq!(
            live_ids,
            record.chunk_ids.iter().cloned().collect::<HashSet<_>>()
        );
        for old_id in &old_ids {
            if !record.chunk_ids.contains(old_id) {
                assert!(f.store.get_many(std::slice::from_ref(old_id)).await.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_one_failing_file_does_not_abort_run() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "good.txt", "fine content");
        write_file(docs.path(), "bad.txt", "FAILME content");
        let f = fixture(docs.path(), Arc::new(FailingEmbedder), Arc::new(TestVision));

        let report = f.coordinator.run().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_files.len(), 1);
        assert!(report.failed_files[0].0.ends_with("bad.txt"));
        assert!(!report.failed_files[0].1.is_empty());

        // The failed document committed nothing
        let bad_path = docs.path().join("bad.txt").to_string_lossy().to_string();
        let record = f.state.get(&bad_path).unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Failed);
        let document_id = Document::generate_id(&bad_path);
        assert!(f.store.chunk_ids_for_document(&document_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "notes.txt", "content");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        let _held = f.coordinator.gate().try_begin().unwrap();
        assert!(f.coordinator.status().busy);

        let err = f.coordinator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_removed_source_leaves_tombstone() {
        let docs = tempfile::tempdir().unwrap();
        let path = write_file(docs.path(), "gone.txt", "here today");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        f.coordinator.run().await.unwrap();
        let path_str = path.to_string_lossy().to_string();
        let chunk_ids = f.state.get(&path_str).unwrap().unwrap().chunk_ids;

        std::fs::remove_file(&path).unwrap();
        let report = f.coordinator.run().await.unwrap();

        assert_eq!(report.removed, 1);
        assert!(f.state.get(&path_str).unwrap().is_none());
        assert!(f.store.get_many(&chunk_ids).await.is_empty());

        let tombstones = f.state.tombstones_since(None).unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].chunk_ids, chunk_ids);
    }

    #[tokio::test]
    async fn test_empty_vision_extraction_skips() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "blank.jpeg", "nothing");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(EmptyVision));

        let report = f.coordinator.run().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(f.store.stats().await.chunks, 0);
    }

    #[tokio::test]
    async fn test_reconcile_removes_orphans_and_fails_interrupted() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "notes.txt", "content");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));
        f.coordinator.run().await.unwrap();

        // Orphan chunk: present in the store, referenced by no record
        let orphan = StoredChunk {
            id: "orphan-1".to_string(),
            document_id: "ghost".to_string(),
            text: "stale".to_string(),
            embedding: vec![1.0, 0.0],
            metadata: ChunkMetadata::default(),
        };
        f.store.upsert(vec![orphan]).await.unwrap();

        // Record stuck mid-commit
        f.state
            .upsert(&ProcessingRecord {
                path: "/vanished/doc.txt".to_string(),
                hash: "h".to_string(),
                status: ProcessingStatus::Processing,
                kind: DocumentKind::Text,
                chunk_ids: vec!["half-committed".to_string()],
                error: None,
                processed_at: Utc::now(),
            })
            .unwrap();

        let report = f.coordinator.reconcile().await.unwrap();

        assert_eq!(report.orphan_chunks_removed, 1);
        assert_eq!(report.interrupted_records, 1);
        assert!(f.store.get_many(&["orphan-1".to_string()]).await.is_empty());
        let record = f.state.get("/vanished/doc.txt").unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Failed);

        // Healthy documents keep their chunks
        let good_path = docs.path().join("notes.txt").to_string_lossy().to_string();
        let good = f.state.get(&good_path).unwrap().unwrap();
        assert_eq!(f.store.get_many(&good.chunk_ids).await.len(), good.chunk_ids.len());
    }

    #[tokio::test]
    async fn test_status_reports_last_run() {
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "notes.txt", "content");
        let f = fixture(docs.path(), Arc::new(TestEmbedder), Arc::new(TestVision));

        assert!(f.coordinator.status().last_report.is_none());
        f.coordinator.run().await.unwrap();

        let status = f.coordinator.status();
        assert!(!status.busy);
        assert_eq!(status.last_report.unwrap().processed, 1);
    }
}
