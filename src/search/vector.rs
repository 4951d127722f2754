use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{Document, StoredDocument};
use crate::search::{BranchResult, VectorSearch};
use crate::text::clean_metadata;

/// Operator name reported by this store's search.
pub const COSINE_SCAN: &str = "cosine_scan";

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

/// In-memory vector store with disk persistence and cosine similarity search.
///
/// Mutations build the next snapshot, persist it, then swap it in, so the
/// in-memory entries always match `vectors.json`.
pub struct VectorStore {
    entries: Arc<RwLock<Vec<VectorEntry>>>,
    // Serializes mutations; searches only wait for the swap.
    write_lock: Mutex<()>,
    persist_path: PathBuf,
    max_entries: usize,
}

impl VectorStore {
    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        Self::open_or_create_with_limit(vector_dir, 0)
    }

    /// Open the store, refusing to grow past `max_entries` (0 = unlimited).
    ///
    /// An unreadable `vectors.json` is moved aside to `vectors.json.corrupt`
    /// and the store starts empty.
    pub fn open_or_create_with_limit(vector_dir: &Path, max_entries: usize) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data =
                std::fs::read_to_string(&persist_path).context("Failed to read vector store")?;
            match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    let quarantine = persist_path.with_extension("json.corrupt");
                    tracing::warn!(
                        "Vector store {} is unreadable ({e}); moved to {} and starting empty",
                        persist_path.display(),
                        quarantine.display()
                    );
                    std::fs::rename(&persist_path, &quarantine)
                        .context("Failed to move corrupt vector store aside")?;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            write_lock: Mutex::new(()),
            persist_path,
            max_entries,
        })
    }

    /// Add vectors for documents. `embeddings` must be parallel with `docs`.
    /// A document whose id is already stored is replaced.
    ///
    /// All or nothing: on a capacity or I/O error nothing changes.
    pub fn add_documents(&self, docs: &[StoredDocument], embeddings: Vec<Vec<f32>>) -> Result<()> {
        let _writer = self.write_lock.lock();
        let mut next = self.entries.read().clone();

        for (doc, embedding) in docs.iter().zip(embeddings) {
            next.retain(|e| e.id != doc.id);
            next.push(VectorEntry {
                id: doc.id.clone(),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                embedding,
            });
        }
        if self.max_entries > 0 && next.len() > self.max_entries {
            anyhow::bail!(
                "Vector store is full ({} entries); refusing to add {} document(s)",
                self.max_entries,
                docs.len()
            );
        }

        self.persist(&next)?;
        *self.entries.write() = next;
        Ok(())
    }

    /// Delete a document's vector. Returns whether anything was removed.
    pub fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let _writer = self.write_lock.lock();
        let mut next = self.entries.read().clone();
        let before = next.len();
        next.retain(|e| e.id != doc_id);
        if next.len() == before {
            return Ok(false);
        }

        self.persist(&next)?;
        *self.entries.write() = next;
        Ok(true)
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let data = serde_json::to_string(entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, &self.persist_path).context("Failed to replace vector store")?;
        Ok(())
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<Document> {
        rank(&self.entries.read(), query_embedding, limit)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

fn rank(entries: &[VectorEntry], query_embedding: &[f32], limit: usize) -> Vec<Document> {
    let mut scored: Vec<(f32, &VectorEntry)> = entries
        .iter()
        .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
        .collect();

    // Sort descending by score
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(score, e)| {
            let mut metadata = clean_metadata(e.metadata.clone());
            metadata.insert("_id".to_string(), Value::String(e.id.clone()));
            Document::new(e.content.clone(), f64::from(score)).with_metadata(metadata)
        })
        .collect()
}

#[async_trait]
impl VectorSearch for VectorStore {
    async fn search(&self, query_vector: &[f32], limit: usize) -> crate::error::Result<BranchResult> {
        let entries = self.entries.clone();
        let query = query_vector.to_vec();
        let documents = tokio::task::spawn_blocking(move || rank(&entries.read(), &query, limit))
            .await
            .context("Vector search task failed")?;
        tracing::info!(
            "vector search operator={COSINE_SCAN} returned {}",
            documents.len()
        );
        Ok(BranchResult {
            total: documents.len(),
            documents,
            operator: Some(COSINE_SCAN.to_string()),
        })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
