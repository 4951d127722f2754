//! Clients for the external model providers: query embeddings and relevance scoring.

pub mod embeddings;
pub mod rerank;
