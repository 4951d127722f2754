use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One of the two retrieval paths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Bm25,
    Vector,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Bm25 => "bm25",
            Branch::Vector => "vector",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieval hit.
///
/// `score` is the raw score on the producing backend's own scale. The
/// derived fields are filled in as the document moves through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norm_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groq_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
}

impl Document {
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            score,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Score used for logging: the most refined score available.
    pub fn best_score(&self) -> f64 {
        self.final_score.or(self.groq_score).unwrap_or(self.score)
    }
}

/// A document as handed to the stores at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Simple (lexical-only) search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
}

/// Simple search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Document>,
    pub total_count: usize,
}

/// Hybrid search request. `bm25_ratio` may also arrive as a query parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct HybridSearchRequest {
    pub query: String,
    pub limit: Option<i64>,
    pub bm25_ratio: Option<f64>,
}

pub fn default_bm25_ratio() -> f64 {
    0.5
}

/// Ingestion request
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<NewDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Ingestion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ids: Vec<String>,
    pub indexed: usize,
    /// Documents that now have a stored vector.
    pub vectors: usize,
    /// True when every document with content got a vector. The rest are
    /// lexical-only.
    pub embedded: bool,
}
