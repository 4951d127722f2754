//! Query embedding via an OpenAI-style `/embeddings` endpoint.
//!
//! Inputs are normalized with [`normalize_query_text`] before lookup, so the
//! cache key and the text sent to the provider are always the same string.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::config::EmbeddingConfig;
use crate::error::{Result, SearchError};
use crate::text::normalize_query_text;

const PROVIDER: &str = "embedding provider";

/// A provider that turns text into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document body for storage. Defaults to [`embed`](Self::embed);
    /// implementations with a query cache should bypass it here.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}

/// Bounded cache of embeddings keyed by normalized text.
///
/// Shared by all in-flight requests; moka handles concurrent reads and inserts.
pub struct EmbeddingCache {
    cache: moka::sync::Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: moka::sync::Cache::new(max_entries),
        }
    }

    pub fn get(&self, normalized: &str) -> Option<Arc<Vec<f32>>> {
        self.cache.get(normalized)
    }

    pub fn insert(&self, normalized: String, embedding: Arc<Vec<f32>>) {
        self.cache.insert(normalized, embedding);
    }
}

/// Resolved URL and headers, computed on first use.
#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    headers: HeaderMap,
}

fn resolve_endpoint(config: &EmbeddingConfig) -> Result<Endpoint> {
    let base = config.api_base.as_deref().map(str::trim).unwrap_or_default();
    if base.is_empty() {
        return Err(SearchError::Config("EMBEDDING_API_BASE is required".to_string()));
    }
    let url = format!("{}/embeddings", base.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SearchError::Config(format!("invalid embedding auth token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(email) = config.user_email.as_deref().filter(|e| !e.is_empty()) {
        let value = HeaderValue::from_str(email)
            .map_err(|e| SearchError::Config(format!("invalid embedding user email: {e}")))?;
        headers.insert(HeaderName::from_static("x-user-email"), value);
    }

    Ok(Endpoint { url, headers })
}

/// HTTP embedding client with a shared cache and one retry on rate limiting.
pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    cache: Arc<EmbeddingCache>,
    endpoint: OnceLock<Endpoint>,
}

impl EmbeddingClient {
    pub fn new(http: reqwest::Client, config: EmbeddingConfig, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            http,
            config,
            cache,
            endpoint: OnceLock::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn api_base(&self) -> Option<&str> {
        self.config.api_base.as_deref()
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn endpoint(&self) -> Result<&Endpoint> {
        if let Some(endpoint) = self.endpoint.get() {
            return Ok(endpoint);
        }
        let resolved = resolve_endpoint(&self.config)?;
        Ok(self.endpoint.get_or_init(|| resolved))
    }

    async fn fetch(&self, normalized: &str) -> Result<Vec<f32>> {
        let endpoint = self.endpoint()?;
        let payload = json!({ "input": normalized, "model": self.config.model });
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));

        for attempt in 0..2 {
            let start = Instant::now();
            let resp = self
                .http
                .post(&endpoint.url)
                .headers(endpoint.headers.clone())
                .timeout(timeout)
                .json(&payload)
                .send()
                .await
                .map_err(|e| SearchError::UpstreamUnavailable {
                    provider: PROVIDER.to_string(),
                    message: format!("request to {} failed: {e}", endpoint.url),
                })?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt == 0 {
                tracing::warn!(
                    "Embedding provider rate limited, retrying in {}ms",
                    self.config.retry_backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SearchError::UpstreamUnavailable {
                    provider: PROVIDER.to_string(),
                    message: format!("{} returned {status}: {body}", endpoint.url),
                });
            }

            let body: Value = resp.json().await.map_err(|e| SearchError::MalformedResponse {
                provider: PROVIDER.to_string(),
                message: format!("response body is not JSON: {e}"),
            })?;
            let embedding =
                parse_embedding_response(&body).ok_or_else(|| SearchError::MalformedResponse {
                    provider: PROVIDER.to_string(),
                    message: format!("unexpected embedding response format from {}", endpoint.url),
                })?;

            tracing::info!(
                "Embedding call ok url={} ms={:.1}",
                endpoint.url,
                start.elapsed().as_secs_f64() * 1000.0
            );
            return Ok(embedding);
        }

        Err(SearchError::UpstreamUnavailable {
            provider: PROVIDER.to_string(),
            message: "rate limited after retry".to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_query_text(text);
        if normalized.is_empty() {
            return Err(SearchError::invalid("cannot embed empty text"));
        }
        if let Some(hit) = self.cache.get(&normalized) {
            return Ok(hit.as_ref().clone());
        }

        let embedding = self.fetch(&normalized).await?;
        self.cache.insert(normalized, Arc::new(embedding.clone()));
        Ok(embedding)
    }

    /// Document bodies go straight to the provider; only queries are cached.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_query_text(text);
        if normalized.is_empty() {
            return Err(SearchError::invalid("cannot embed empty text"));
        }
        self.fetch(&normalized).await
    }
}

/// Accept `{"data": [{"embedding": [...]}]}`, `{"embedding": [...]}` or a bare `[...]`.
pub fn parse_embedding_response(body: &Value) -> Option<Vec<f32>> {
    let vector = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|first| first.get("embedding"))
        .or_else(|| body.get("embedding"))
        .or_else(|| body.is_array().then_some(body))?;

    vector
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
