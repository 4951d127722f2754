//! Retrieval adapters and the hybrid orchestration built on top of them.

pub mod bm25;
pub mod dedup;
pub mod fanout;
pub mod hybrid;
pub mod scores;
pub mod vector;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Document;

/// Output of one retrieval branch for one request.
#[derive(Debug, Clone, Default)]
pub struct BranchResult {
    pub documents: Vec<Document>,
    /// Total matches as reported by the backend (may exceed `documents.len()`).
    pub total: usize,
    /// Search operator name; vector branch only.
    pub operator: Option<String>,
}

/// Keyword / full-text search backend.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<BranchResult>;
}

/// Nearest-neighbour search over embedding vectors.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<BranchResult>;
}
