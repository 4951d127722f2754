//! # hybrid-search
//!
//! A retrieval service that answers a query by combining BM25 full-text
//! search with embedding similarity search, reranking each branch through
//! an LLM relevance scorer with a deterministic fallback.
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────┐
//!                       │ Query + limit +  │
//!                       │    bm25_ratio    │
//!                       └────────┬─────────┘
//!                                │ budget split (2× over-fetch)
//!                   ┌────────────┴────────────┐
//!                   ▼                         ▼
//!          ┌────────────────┐       ┌──────────────────┐
//!          │  BM25 (tantivy)│       │ Embed ─▶ Cosine  │
//!          │                │       │  (cached client) │
//!          └───────┬────────┘       └────────┬─────────┘
//!                  │ failure / timeout = empty branch
//!                  └────────────┬────────────┘
//!                               ▼
//!                  ┌────────────────────────┐
//!                  │ Per-branch normalize   │
//!                  │ Dedup (BM25 precedence)│
//!                  └───────────┬────────────┘
//!                              ▼
//!                  ┌────────────────────────┐
//!                  │ Groq rerank per branch │
//!                  │ (raw-score fallback)   │
//!                  └───────────┬────────────┘
//!                              ▼
//!                  ┌────────────────────────┐
//!                  │ Merge, sort by         │
//!                  │ final_score, trim      │
//!                  └────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for limits, providers and data dirs
//! - [`models`] - Documents and request/response types
//! - [`error`] - `SearchError` taxonomy
//! - [`context`] - Per-request context and structured stage logging
//! - [`text`] - Query normalization and metadata sanitizing
//! - [`search::bm25`] - BM25 full-text index powered by tantivy
//! - [`search::vector`] - In-memory vector store with cosine similarity and disk persistence
//! - [`search::fanout`] - Concurrent branch dispatch with failure isolation
//! - [`search::hybrid`] - Normalize, dedup, rerank and assemble the final result set
//! - [`llm::embeddings`] - Cached query embeddings with rate-limit retry
//! - [`llm::rerank`] - Groq relevance scoring with fallback ordering
//! - [`api`] - Axum HTTP handlers for search, ingestion and health
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod text;
