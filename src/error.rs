//! Error taxonomy for the retrieval pipeline.
//!
//! Only [`SearchError::InvalidInput`] and configuration problems are meant to
//! reach callers; the other variants are absorbed by the pipeline into
//! degraded results.

use thiserror::Error;

use crate::models::Branch;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Bad limit, ratio or empty text. Rejected before any retrieval work.
    #[error("{0}")]
    InvalidInput(String),

    /// One retrieval branch errored or timed out.
    #[error("{branch} branch failed: {message}")]
    BranchFailure { branch: Branch, message: String },

    /// The external relevance scorer failed or returned unusable output.
    #[error("Scorer error: {0}")]
    ScorerFailure(String),

    /// An upstream provider could not be reached or kept failing.
    #[error("{provider} unavailable: {message}")]
    UpstreamUnavailable { provider: String, message: String },

    /// An external collaborator answered with an unexpected shape.
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage adapter failure (index or vector store).
    #[error("Index error: {0:#}")]
    Index(#[from] anyhow::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl SearchError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
