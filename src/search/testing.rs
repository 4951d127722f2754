//! In-memory branch and embedding fakes shared by the orchestration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, SearchError};
use crate::llm::embeddings::EmbeddingProvider;
use crate::models::{Branch, Document};
use crate::search::{BranchResult, LexicalSearch, VectorSearch};

/// Document with an explicit `_id`.
pub fn doc(id: &str, score: f64) -> Document {
    let mut doc = Document::new(format!("content of {id}"), score);
    doc.metadata.insert("_id".to_string(), json!(id));
    doc
}

/// Returns its documents truncated to the requested limit and records each call.
pub struct StaticLexical {
    documents: Vec<Document>,
    total: usize,
    calls: AtomicUsize,
    last_limit: Mutex<Option<usize>>,
}

impl StaticLexical {
    pub fn new(documents: Vec<Document>, total: usize) -> Self {
        Self {
            documents,
            total,
            calls: AtomicUsize::new(0),
            last_limit: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_limit(&self) -> Option<usize> {
        *self.last_limit.lock()
    }
}

#[async_trait]
impl LexicalSearch for StaticLexical {
    async fn search(&self, _query: &str, limit: usize) -> Result<BranchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limit.lock() = Some(limit);
        Ok(BranchResult {
            documents: self.documents.iter().take(limit).cloned().collect(),
            total: self.total,
            operator: None,
        })
    }
}

pub struct StaticVector {
    documents: Vec<Document>,
    total: usize,
    calls: AtomicUsize,
    last_limit: Mutex<Option<usize>>,
}

impl StaticVector {
    pub fn new(documents: Vec<Document>, total: usize) -> Self {
        Self {
            documents,
            total,
            calls: AtomicUsize::new(0),
            last_limit: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_limit(&self) -> Option<usize> {
        *self.last_limit.lock()
    }
}

#[async_trait]
impl VectorSearch for StaticVector {
    async fn search(&self, _query_vector: &[f32], limit: usize) -> Result<BranchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limit.lock() = Some(limit);
        Ok(BranchResult {
            documents: self.documents.iter().take(limit).cloned().collect(),
            total: self.total,
            operator: Some("fake_knn".to_string()),
        })
    }
}

pub struct FailingVector;

#[async_trait]
impl VectorSearch for FailingVector {
    async fn search(&self, _query_vector: &[f32], _limit: usize) -> Result<BranchResult> {
        Err(SearchError::BranchFailure {
            branch: Branch::Vector,
            message: "index offline".to_string(),
        })
    }
}

pub struct FailingLexical;

#[async_trait]
impl LexicalSearch for FailingLexical {
    async fn search(&self, _query: &str, _limit: usize) -> Result<BranchResult> {
        Err(SearchError::BranchFailure {
            branch: Branch::Bm25,
            message: "index offline".to_string(),
        })
    }
}

pub struct SlowLexical(pub Duration);

#[async_trait]
impl LexicalSearch for SlowLexical {
    async fn search(&self, _query: &str, _limit: usize) -> Result<BranchResult> {
        tokio::time::sleep(self.0).await;
        Ok(BranchResult::default())
    }
}

pub struct PanickingLexical;

#[async_trait]
impl LexicalSearch for PanickingLexical {
    async fn search(&self, _query: &str, _limit: usize) -> Result<BranchResult> {
        panic!("lexical backend bug")
    }
}

pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

pub struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(SearchError::UpstreamUnavailable {
            provider: "embedding provider".to_string(),
            message: "connection refused".to_string(),
        })
    }
}
