use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the lexical index and vector data are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Request limits and branch timeout
    pub search: SearchConfig,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// External relevance scorer (Groq, OpenAI-compatible chat completions)
    pub scorer: ScorerConfig,
    /// Maximum total vector entries in memory (0 = unlimited)
    pub max_vector_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Limit used when a request omits one
    pub default_limit: i64,
    /// Largest accepted limit
    pub max_limit: i64,
    /// Per-branch retrieval timeout in seconds. Expiry counts as a branch failure.
    pub branch_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            branch_timeout_secs: 10,
        }
    }
}

impl SearchConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the provider; `/embeddings` is appended.
    /// If None, every embedding call fails and the vector branch degrades.
    pub api_base: Option<String>,
    /// Model name sent with each request
    pub model: String,
    /// Bearer token
    pub auth_token: Option<String>,
    /// Sent as `X-User-Email` when set
    pub user_email: Option<String>,
    /// Maximum number of cached query embeddings
    pub cache_capacity: u64,
    /// Delay before the single retry on a rate-limit response
    pub retry_backoff_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            model: "text-embedding-3-small".to_string(),
            auth_token: None,
            user_email: None,
            cache_capacity: 256,
            retry_backoff_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Base URL of the OpenAI-compatible API; `/chat/completions` is appended.
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 60).
    pub timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: None,
            timeout_secs: 20,
        }
    }
}

impl ScorerConfig {
    /// The scorer is only used when both a key and a model are present.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.model.as_deref().is_some_and(|m| !m.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            scorer: ScorerConfig::default(),
            max_vector_entries: 500_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("HYBRID_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("HYBRID_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("HYBRID_SEARCH_MAX_VECTOR_ENTRIES") {
            if let Ok(v) = val.parse() {
                config.max_vector_entries = v;
            }
        }

        // Search limits
        if let Ok(val) = std::env::var("DEFAULT_LIMIT") {
            if let Ok(v) = val.parse() {
                config.search.default_limit = v;
            }
        }
        if let Ok(val) = std::env::var("MAX_LIMIT") {
            if let Ok(v) = val.parse() {
                config.search.max_limit = v;
            }
        }
        if let Ok(val) = std::env::var("BRANCH_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.search.branch_timeout_secs = v;
            }
        }

        // Embedding provider
        if let Ok(base) = std::env::var("EMBEDDING_API_BASE") {
            if !base.trim().is_empty() {
                config.embedding.api_base = Some(base);
            }
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(token) = std::env::var("EMBEDDING_AUTH_TOKEN") {
            config.embedding.auth_token = Some(token);
        }
        if let Ok(email) = std::env::var("EMBEDDING_USER_EMAIL") {
            config.embedding.user_email = Some(email);
        }
        if let Ok(val) = std::env::var("EMBEDDING_CACHE_CAPACITY") {
            if let Ok(v) = val.parse() {
                config.embedding.cache_capacity = v;
            }
        }
        if let Ok(val) = std::env::var("EMBEDDING_RETRY_BACKOFF_MS") {
            if let Ok(v) = val.parse() {
                config.embedding.retry_backoff_ms = v;
            }
        }
        if let Ok(val) = std::env::var("EMBEDDING_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.embedding.timeout_secs = v;
            }
        }

        // Scorer
        if let Ok(base) = std::env::var("GROQ_API_BASE") {
            config.scorer.api_base = base;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            config.scorer.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("GROQ_MODEL") {
            config.scorer.model = Some(model);
        }
        if let Ok(val) = std::env::var("GROQ_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.scorer.timeout_secs = v.min(60); // Cap at 60s
            }
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_requires_key_and_model() {
        let mut scorer = ScorerConfig::default();
        assert!(!scorer.is_configured());

        scorer.api_key = Some("gsk_test".to_string());
        assert!(!scorer.is_configured());

        scorer.model = Some("llama-3.1-8b-instant".to_string());
        assert!(scorer.is_configured());

        scorer.api_key = Some(String::new());
        assert!(!scorer.is_configured());
    }

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.max_limit, 100);
        assert_eq!(config.search.branch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_data_subdirectories() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/hs"),
            ..Config::default()
        };
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/hs/index"));
        assert_eq!(config.vector_dir(), PathBuf::from("/tmp/hs/vectors"));
    }
}
