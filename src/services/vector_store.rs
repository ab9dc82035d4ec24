//! Embedded vector store.
//!
//! A file-persisted collection of `(chunk id -> text, embedding, metadata)`
//! with cosine-similarity search and metadata filtering. Queries take a read
//! lock and may run concurrently; merges and wholesale replacement take the
//! write lock for their full duration, so a merge never races a query.
//!
//! The relevance floor for answering (0.5) is a caller contract enforced by
//! the query engine, not by the store.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{ChunkMetadata, ScoredChunk, StoredChunk};

const COLLECTION_FILE: &str = "collection.json";
const BACKUP_FILE: &str = "collection.json.bak";

/// One filter predicate against a metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMatch {
    Equals(String),
    /// Inclusive range over the string form of the field. ISO-8601 dates
    /// compare correctly as strings.
    Range {
        min: Option<String>,
        max: Option<String>,
    },
}

/// Conjunction of field predicates.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    clauses: Vec<(String, ValueMatch)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((key.into(), ValueMatch::Equals(value.into())));
        self
    }

    #[must_use]
    pub fn range(
        mut self,
        key: impl Into<String>,
        min: Option<String>,
        max: Option<String>,
    ) -> Self {
        self.clauses.push((key.into(), ValueMatch::Range { min, max }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.clauses.iter().all(|(key, predicate)| {
            let Some(value) = metadata.value_of(key) else {
                return false;
            };
            match predicate {
                ValueMatch::Equals(expected) => value == *expected,
                ValueMatch::Range { min, max } => {
                    min.as_ref().is_none_or(|m| value >= *m)
                        && max.as_ref().is_none_or(|m| value <= *m)
                }
            }
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    /// Vector dimension, fixed by the first inserted chunk.
    dimension: Option<usize>,
    chunks: BTreeMap<String, StoredChunk>,
}

/// Counts reported by [`VectorStore::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub chunks: u64,
    pub documents: u64,
    pub dimension: Option<usize>,
}

/// Embedded, persisted vector store.
pub struct VectorStore {
    path: PathBuf,
    inner: RwLock<Collection>,
}

impl VectorStore {
    /// Open the collection under `data_dir`, loading any persisted state.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(COLLECTION_FILE);

        let collection = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Collection::default()
        };

        Ok(Self {
            path,
            inner: RwLock::new(collection),
        })
    }

    /// In-memory store for tests and ephemeral use; persists into the given
    /// directory like `open` but starts empty.
    pub fn create(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(COLLECTION_FILE),
            inner: RwLock::new(Collection::default()),
        })
    }

    /// Insert or overwrite chunks by id. Idempotent. A dimension conflict
    /// rejects the whole batch before any mutation.
    pub async fn upsert(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        check_dimensions(&mut inner, &chunks)?;
        for chunk in chunks {
            inner.chunks.insert(chunk.id.clone(), chunk);
        }
        persist(&self.path, &inner)
    }

    /// Delete chunks by id. Unknown ids are a no-op. Returns removed count.
    pub async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for id in ids {
            if inner.chunks.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            persist(&self.path, &inner)?;
        }
        Ok(removed)
    }

    /// Delete every chunk whose id is not in `keep`. Returns removed count.
    /// Used by the reconcile pass to drop orphans.
    pub async fn delete_not_in(&self, keep: &HashSet<String>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.chunks.len();
        inner.chunks.retain(|id, _| keep.contains(id));
        let removed = (before - inner.chunks.len()) as u64;
        if removed > 0 {
            persist(&self.path, &inner)?;
        }
        Ok(removed)
    }

    /// Ranked cosine-similarity search with metadata filtering.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let inner = self.inner.read().await;

        if let Some(dimension) = inner.dimension
            && vector.len() != dimension
        {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = inner
            .chunks
            .values()
            .filter(|chunk| filter.matches(&chunk.metadata))
            .map(|chunk| ScoredChunk {
                chunk_id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                similarity: cosine_similarity(vector, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Chunk ids currently owned by a document.
    pub async fn chunk_ids_for_document(&self, document_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Snapshot of the whole collection, for full exports.
    pub async fn all_chunks(&self) -> Vec<StoredChunk> {
        let inner = self.inner.read().await;
        inner.chunks.values().cloned().collect()
    }

    /// Chunks by id, skipping unknown ids. Used for incremental exports.
    pub async fn get_many(&self, ids: &[String]) -> Vec<StoredChunk> {
        let inner = self.inner.read().await;
        ids.iter()
            .filter_map(|id| inner.chunks.get(id).cloned())
            .collect()
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        let documents: HashSet<&str> = inner
            .chunks
            .values()
            .map(|c| c.document_id.as_str())
            .collect();
        StoreStats {
            chunks: inner.chunks.len() as u64,
            documents: documents.len() as u64,
            dimension: inner.dimension,
        }
    }

    pub async fn dimension(&self) -> Option<usize> {
        self.inner.read().await.dimension
    }

    /// Apply an incremental merge under one write lock: upsert every
    /// incoming chunk, then apply the deletion list.
    ///
    /// Returns `(merged, updated, deleted)`. `merged` counts newly inserted
    /// ids, `updated` counts ids whose stored content actually changed, and
    /// identical re-application of the same package counts nothing, which is
    /// what makes merge idempotent.
    pub async fn apply_merge(
        &self,
        chunks: Vec<StoredChunk>,
        deletions: &[String],
    ) -> Result<(u64, u64, u64), StoreError> {
        let mut inner = self.inner.write().await;
        check_dimensions(&mut inner, &chunks)?;

        let mut merged = 0;
        let mut updated = 0;
        for chunk in chunks {
            match inner.chunks.get(&chunk.id) {
                None => {
                    inner.chunks.insert(chunk.id.clone(), chunk);
                    merged += 1;
                }
                Some(existing) if *existing != chunk => {
                    inner.chunks.insert(chunk.id.clone(), chunk);
                    updated += 1;
                }
                Some(_) => {}
            }
        }

        let mut deleted = 0;
        for id in deletions {
            if inner.chunks.remove(id).is_some() {
                deleted += 1;
            }
        }

        persist(&self.path, &inner)?;
        Ok((merged, updated, deleted))
    }

    /// Replace the whole collection. A backup of the previous state is
    /// written first; if persisting the replacement fails, the previous
    /// state is restored in memory and on disk.
    pub async fn replace_collection(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        // Build the replacement fully before touching the live collection
        let mut replacement = Collection::default();
        check_dimensions(&mut replacement, &chunks)?;
        for chunk in chunks {
            replacement.chunks.insert(chunk.id.clone(), chunk);
        }

        let backup_path = self.path.with_file_name(BACKUP_FILE);
        if self.path.exists() {
            std::fs::copy(&self.path, &backup_path)?;
        }

        let previous = std::mem::replace(&mut *inner, replacement);

        if let Err(e) = persist(&self.path, &inner) {
            *inner = previous;
            if backup_path.exists() {
                let _ = std::fs::copy(&backup_path, &self.path);
            }
            return Err(e);
        }

        Ok(())
    }
}

/// Validate an incoming batch against the collection dimension (fixed by
/// the first chunk ever inserted) without mutating the chunk set.
fn check_dimensions(collection: &mut Collection, chunks: &[StoredChunk]) -> Result<(), StoreError> {
    let Some(first) = chunks.first() else {
        return Ok(());
    };
    let dimension = *collection
        .dimension
        .get_or_insert_with(|| first.embedding.len());

    for chunk in chunks {
        if chunk.embedding.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: chunk.embedding.len(),
            });
        }
    }
    Ok(())
}

/// Atomic persist: write to a temp file, then rename over the collection.
fn persist(path: &Path, collection: &Collection) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string(collection)?;
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, DocumentKind};
    use std::path::PathBuf;

    fn chunk(id: &str, doc: &str, embedding: Vec<f32>, store: Option<&str>) -> StoredChunk {
        let mut metadata = ChunkMetadata::for_document(
            &PathBuf::from(format!("/receipts/{doc}.jpeg")),
            DocumentKind::Receipt,
            0,
        );
        metadata.store = store.map(String::from);
        StoredChunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            text: format!("chunk {id}"),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();

        let c = chunk("c1", "d1", vec![1.0, 0.0], None);
        store.upsert(vec![c.clone()]).await.unwrap();
        store.upsert(vec![c]).await.unwrap();

        assert_eq!(store.stats().await.chunks, 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_ids_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![chunk("c1", "d1", vec![1.0, 0.0], None)])
            .await
            .unwrap();

        let removed = store
            .delete(&["c1".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.stats().await.chunks, 0);
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![
                chunk("near", "d1", vec![1.0, 0.1], None),
                chunk("far", "d2", vec![0.0, 1.0], None),
            ])
            .await
            .unwrap();

        let results = store
            .query(&[1.0, 0.0], 10, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(results[0].chunk_id, "near");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![chunk("c1", "d1", vec![1.0, 0.0], None)])
            .await
            .unwrap();

        let err = store
            .query(&[1.0, 0.0, 0.0], 10, &MetadataFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_metadata_equality_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![
                chunk("a", "d1", vec![1.0, 0.0], Some("Costco Wholesale")),
                chunk("b", "d2", vec![1.0, 0.0], Some("NOFRILLS")),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter::new().eq("store", "Costco Wholesale");
        let results = store.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn test_metadata_date_range_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();

        let mut early = chunk("early", "d1", vec![1.0, 0.0], None);
        early.metadata.date = Some("2026-01-05".to_string());
        let mut late = chunk("late", "d2", vec![1.0, 0.0], None);
        late.metadata.date = Some("2026-03-20".to_string());
        store.upsert(vec![early, late]).await.unwrap();

        let filter = MetadataFilter::new().range(
            "date",
            Some("2026-02-01".to_string()),
            Some("2026-02-28".to_string()),
        );
        let results = store.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert!(results.is_empty());

        let filter = MetadataFilter::new().range("date", Some("2026-03-01".to_string()), None);
        let results = store.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "late");
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::create(dir.path()).unwrap();
            store
                .upsert(vec![chunk("c1", "d1", vec![1.0, 0.0], Some("Costco Wholesale"))])
                .await
                .unwrap();
        }

        let reopened = VectorStore::open(dir.path()).unwrap();
        let stats = reopened.stats().await;
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.dimension, Some(2));

        let results = reopened
            .query(&[1.0, 0.0], 1, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(results[0].metadata.store.as_deref(), Some("Costco Wholesale"));
    }

    #[tokio::test]
    async fn test_apply_merge_counts_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![chunk("keep", "d0", vec![1.0, 0.0], None)])
            .await
            .unwrap();

        let incoming = vec![
            chunk("keep", "d0", vec![1.0, 0.0], None), // identical
            chunk("new", "d1", vec![0.5, 0.5], None),
        ];
        let deletions = vec!["absent".to_string()];

        let (merged, updated, deleted) =
            store.apply_merge(incoming.clone(), &deletions).await.unwrap();
        assert_eq!((merged, updated, deleted), (1, 0, 0));

        // Second identical application changes nothing
        let (merged, updated, deleted) = store.apply_merge(incoming, &deletions).await.unwrap();
        assert_eq!((merged, updated, deleted), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_replace_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        store
            .upsert(vec![chunk("old", "d0", vec![1.0, 0.0], None)])
            .await
            .unwrap();

        store
            .replace_collection(vec![chunk("new", "d1", vec![0.0, 1.0], None)])
            .await
            .unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.chunks, 1);
        assert!(store.get_many(&["old".to_string()]).await.is_empty());
        assert_eq!(store.get_many(&["new".to_string()]).await.len(), 1);
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
