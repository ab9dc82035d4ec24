use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of source document, which decides the extraction pipeline and which
/// metadata fields are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    /// Image processed through the vision extractor (receipts, invoices).
    Receipt,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Text => write!(f, "text"),
            DocumentKind::Receipt => write!(f, "receipt"),
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(DocumentKind::Text),
            "receipt" => Ok(DocumentKind::Receipt),
            _ => Err(format!("unknown document kind: {}", s)),
        }
    }
}

/// A discovered source document. Identity is the source path; the content
/// hash decides whether reprocessing is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub kind: DocumentKind,
    pub hash: String,
    pub discovered_at: String,
}

impl Document {
    /// Stable document id derived from the source path.
    pub fn generate_id(path: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(path.as_bytes());
        hex::encode(&hash[..16])
    }

    pub fn new(path: impl Into<String>, kind: DocumentKind, hash: String) -> Self {
        let path = path.into();
        Self {
            id: Self::generate_id(&path),
            path,
            kind,
            hash,
            discovered_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Flexible per-chunk metadata: a small set of well-known optional fields
/// plus an open extension map, tagged by document kind.
///
/// Receipt-only fields (store, total, currency) are only trusted when the
/// kind is `Receipt`; `sanitize` strips them otherwise so aggregation never
/// sums fields from documents that cannot legitimately carry them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub folder_path: String,
    pub kind: Option<DocumentKind>,
    pub chunk_index: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// ISO-8601 date (YYYY-MM-DD) when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

const RECEIPT_ONLY_EXTRA: &[&str] = &["payment_method", "card_last_four", "line_items"];

impl ChunkMetadata {
    pub fn for_document(path: &Path, kind: DocumentKind, chunk_index: u32) -> Self {
        Self {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            folder_path: path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            kind: Some(kind),
            chunk_index,
            ..Default::default()
        }
    }

    /// Drop fields the document kind is not allowed to carry.
    pub fn sanitize(mut self) -> Self {
        if self.kind != Some(DocumentKind::Receipt) {
            self.store = None;
            self.total = None;
            self.currency = None;
            for key in RECEIPT_ONLY_EXTRA {
                self.extra.remove(*key);
            }
        }
        self
    }

    /// Look up a field by name, covering both well-known and extension fields.
    pub fn value_of(&self, key: &str) -> Option<String> {
        match key {
            "filename" => Some(self.filename.clone()),
            "folder_path" => Some(self.folder_path.clone()),
            "kind" => self.kind.map(|k| k.to_string()),
            "store" => self.store.clone(),
            "total" => self.total.map(|t| format!("{:.2}", t)),
            "date" => self.date.clone(),
            "currency" => self.currency.clone(),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// All populated (key, value) pairs, well-known fields first.
    pub fn field_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref store) = self.store {
            pairs.push(("store".to_string(), store.clone()));
        }
        if let Some(total) = self.total {
            pairs.push(("total".to_string(), format!("{:.2}", total)));
        }
        if let Some(ref date) = self.date {
            pairs.push(("date".to_string(), date.clone()));
        }
        if let Some(ref currency) = self.currency {
            pairs.push(("currency".to_string(), currency.clone()));
        }
        for (k, v) in &self.extra {
            pairs.push((k.clone(), v.clone()));
        }
        pairs
    }
}

/// A chunk of one document, before embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    /// Deterministic chunk id: the same document and ordinal always map to
    /// the same id, which is what makes re-merging a package idempotent.
    pub fn generate_id(document_id: &str, chunk_index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn new(document_id: &str, text: String, metadata: ChunkMetadata) -> Self {
        Self {
            id: Self::generate_id(document_id, metadata.chunk_index),
            document_id: document_id.to_string(),
            text,
            metadata,
        }
    }
}

/// A chunk as persisted in the vector store: text, embedding, and metadata
/// always travel together, so no orphaned embeddings can exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl StoredChunk {
    pub fn from_chunk(chunk: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            text: chunk.text,
            embedding,
            metadata: chunk.metadata,
        }
    }
}
