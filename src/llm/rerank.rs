use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ScorerConfig;
use crate::error::{Result, SearchError};
use crate::models::Document;
use crate::text::{clean_metadata, truncate_chars};

/// Characters of content (and of serialized metadata) sent per candidate.
const MAX_CANDIDATE_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You score search results for relevance on a scale from 0 to 1. \
     Respond with JSON:{\"scores\":[{\"idx\":int,\"score\":float}]}.";

/// External scorer that rates each candidate's relevance to a query.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Identity reported in response params (e.g. the model name).
    fn name(&self) -> &str;

    /// Return a relevance score in [0, 1] keyed by candidate index.
    /// Missing indices are allowed.
    async fn score(
        &self,
        query: &str,
        candidates: &[Document],
        group: &str,
    ) -> Result<HashMap<usize, f64>>;
}

/// Reorders a candidate group through an optional external scorer,
/// falling back to raw-score ordering whenever the scorer is absent or fails.
#[derive(Clone, Default)]
pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl Reranker {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        Self { scorer }
    }

    /// Reranker that always uses the local fallback.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build from configuration: a Groq scorer when key and model are present.
    pub fn from_config(http: reqwest::Client, config: &ScorerConfig) -> Self {
        if config.is_configured() {
            Self::new(Some(Arc::new(GroqScorer::new(http, config.clone()))))
        } else {
            Self::disabled()
        }
    }

    pub fn scorer_name(&self) -> Option<&str> {
        self.scorer.as_deref().map(|s| s.name())
    }

    /// Return at most `top_k` documents ordered by relevance, each carrying a `groq_score`.
    pub async fn rerank(
        &self,
        query: &str,
        docs: Vec<Document>,
        top_k: usize,
        group: &str,
    ) -> Vec<Document> {
        if top_k == 0 || docs.is_empty() {
            return Vec::new();
        }

        let Some(scorer) = self.scorer.as_ref() else {
            return fallback_rank(docs, top_k);
        };

        let submit = docs.len().min((top_k * 2).max(top_k));
        let candidates = &docs[..submit];

        let start = Instant::now();
        match scorer.score(query, candidates, group).await {
            Ok(scores) => {
                let elapsed_ms = (start.elapsed().as_secs_f64() * 1000.0 * 10.0).round() / 10.0;
                apply_scores(candidates.to_vec(), &scores, elapsed_ms, top_k)
            }
            Err(e) => {
                tracing::warn!("Groq rerank failed for {group}, falling back to intrinsic scores: {e}");
                fallback_rank(docs, top_k)
            }
        }
    }
}

/// Deterministic local ranking: raw score descending, `groq_score = score`.
pub fn fallback_rank(mut docs: Vec<Document>, top_k: usize) -> Vec<Document> {
    docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    docs.truncate(top_k);
    for doc in docs.iter_mut() {
        doc.groq_score = Some(doc.score);
        doc.metadata = clean_metadata(std::mem::take(&mut doc.metadata));
        doc.metadata.insert("groq_score".to_string(), Value::from(doc.score));
    }
    docs
}

fn apply_scores(
    mut candidates: Vec<Document>,
    scores: &HashMap<usize, f64>,
    elapsed_ms: f64,
    top_k: usize,
) -> Vec<Document> {
    for (idx, doc) in candidates.iter_mut().enumerate() {
        let groq_score = scores.get(&idx).copied().unwrap_or(doc.score);
        doc.groq_score = Some(groq_score);
        doc.metadata = clean_metadata(std::mem::take(&mut doc.metadata));
        doc.metadata.insert("groq_score".to_string(), Value::from(groq_score));
        doc.metadata.insert("groq_response_ms".to_string(), Value::from(elapsed_ms));
    }
    candidates.sort_by(|a, b| {
        let a = a.groq_score.unwrap_or(a.score);
        let b = b.groq_score.unwrap_or(b.score);
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_k);
    candidates
}

// ─── Groq (OpenAI-compatible chat completions) ──────────

pub struct GroqScorer {
    http: reqwest::Client,
    config: ScorerConfig,
    model: String,
}

impl GroqScorer {
    pub fn new(http: reqwest::Client, config: ScorerConfig) -> Self {
        let model = config.model.clone().unwrap_or_default();
        Self {
            http,
            config,
            model,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Build the user message listing candidates by index.
pub fn build_user_prompt(query: &str, candidates: &[Document], group: &str) -> String {
    let lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let mut line = format!("{idx}: {}", truncate_chars(&candidate.content, MAX_CANDIDATE_CHARS));
            if !candidate.metadata.is_empty() {
                let metadata = serde_json::to_string(&candidate.metadata).unwrap_or_default();
                line.push_str(" | metadata: ");
                line.push_str(&truncate_chars(&metadata, MAX_CANDIDATE_CHARS));
            }
            line
        })
        .collect();

    format!(
        "Query: {query}\nGroup: {group}\nCandidates:\n{}\nReturn JSON with an entry for each candidate.",
        lines.join("\n")
    )
}

/// Parse `{"scores": [{"idx": 0, "score": 0.9}, ...]}` or a bare list of entries.
///
/// Entries with a non-integer index or non-numeric score are skipped.
pub fn parse_scores(content: &str) -> Result<HashMap<usize, f64>> {
    let parsed: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => {
            // Try to extract JSON from surrounding prose
            let start = content.find(['{', '[']);
            let end = content.rfind(['}', ']']);
            match (start, end) {
                (Some(s), Some(e)) if e > s => serde_json::from_str(&content[s..=e])
                    .map_err(|e| SearchError::ScorerFailure(format!("unparseable scores: {e}")))?,
                _ => {
                    return Err(SearchError::ScorerFailure(
                        "scorer response contains no JSON".to_string(),
                    ))
                }
            }
        }
    };

    let entries = match &parsed {
        Value::Object(map) => map.get("scores").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    }
    .ok_or_else(|| SearchError::ScorerFailure("scorer response has no scores list".to_string()))?;

    let mut scores = HashMap::new();
    for entry in entries {
        let idx = entry.get("idx").and_then(Value::as_u64);
        let score = entry.get("score").and_then(Value::as_f64);
        if let (Some(idx), Some(score)) = (idx, score) {
            scores.insert(idx as usize, score);
        }
    }
    Ok(scores)
}

#[async_trait]
impl RelevanceScorer for GroqScorer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn score(
        &self,
        query: &str,
        candidates: &[Document],
        group: &str,
    ) -> Result<HashMap<usize, f64>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::Config("GROQ_API_KEY not configured".to_string()))?;
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        let req = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(query, candidates, group),
                },
            ],
        };

        let timeout = Duration::from_secs(self.config.timeout_secs.clamp(1, 60));

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| SearchError::ScorerFailure(format!("failed to reach scorer: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::ScorerFailure(format!("scorer returned {status}: {body}")));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::ScorerFailure(format!("failed to parse scorer response: {e}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        parse_scores(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedScorer(HashMap<usize, f64>);

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(&self, _: &str, _: &[Document], _: &str) -> Result<HashMap<usize, f64>> {
            Ok(self.0.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl RelevanceScorer for FailingScorer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn score(&self, _: &str, _: &[Document], _: &str) -> Result<HashMap<usize, f64>> {
            Err(SearchError::ScorerFailure("boom".to_string()))
        }
    }

    fn docs(scores: &[f64]) -> Vec<Document> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| Document::new(format!("doc {i}"), *s))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_inputs_return_empty() {
        let reranker = Reranker::disabled();
        assert!(reranker.rerank("q", Vec::new(), 3, "bm25").await.is_empty());
        assert!(reranker.rerank("q", docs(&[1.0]), 0, "bm25").await.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_orders_by_raw_score() {
        let reranker = Reranker::disabled();
        let out = reranker.rerank("q", docs(&[0.2, 0.9, 0.5, 0.7]), 2, "vector").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "doc 1");
        assert_eq!(out[1].content, "doc 3");
        for doc in &out {
            assert_eq!(doc.groq_score, Some(doc.score));
            assert_eq!(doc.metadata["groq_score"], json!(doc.score));
            assert!(doc.metadata.get("groq_response_ms").is_none());
        }
        assert!(reranker.scorer_name().is_none());
    }

    #[tokio::test]
    async fn test_scorer_scores_reorder_candidates() {
        let scores = HashMap::from([(0, 0.1), (1, 0.95)]);
        let reranker = Reranker::new(Some(Arc::new(FixedScorer(scores))));
        // candidate 2 has no score and keeps its raw 0.5
        let out = reranker.rerank("q", docs(&[3.0, 1.0, 0.5]), 2, "bm25").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "doc 1");
        assert_eq!(out[0].groq_score, Some(0.95));
        assert_eq!(out[1].content, "doc 2");
        assert_eq!(out[1].groq_score, Some(0.5));
        assert!(out[0].metadata.contains_key("groq_response_ms"));
        assert_eq!(reranker.scorer_name(), Some("fixed"));
    }

    #[tokio::test]
    async fn test_only_twice_top_k_candidates_submitted() {
        let scores = HashMap::from([(4, 1.0)]);
        let reranker = Reranker::new(Some(Arc::new(FixedScorer(scores))));
        // index 4 is beyond the 2 * top_k = 4 submitted candidates
        let out = reranker.rerank("q", docs(&[0.1, 0.2, 0.3, 0.4, 0.05]), 2, "bm25").await;
        assert!(out.iter().all(|d| d.content != "doc 4"));
        assert_eq!(out[0].content, "doc 3");
    }

    #[tokio::test]
    async fn test_scorer_failure_falls_back() {
        let reranker = Reranker::new(Some(Arc::new(FailingScorer)));
        let out = reranker.rerank("q", docs(&[0.3, 0.8]), 5, "vector").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "doc 1");
        assert_eq!(out[0].groq_score, Some(0.8));
    }

    #[test]
    fn test_parse_scores_object_and_list() {
        let scores = parse_scores(r#"{"scores":[{"idx":0,"score":0.4},{"idx":2,"score":1}]}"#).unwrap();
        assert_eq!(scores.get(&0), Some(&0.4));
        assert_eq!(scores.get(&2), Some(&1.0));

        let scores = parse_scores(r#"[{"idx":1,"score":0.7}]"#).unwrap();
        assert_eq!(scores.get(&1), Some(&0.7));
    }

    #[test]
    fn test_parse_scores_skips_bad_entries() {
        let scores =
            parse_scores(r#"{"scores":[{"idx":"0","score":0.4},{"idx":1,"score":"high"},{"idx":2,"score":0.3}]}"#)
                .unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.get(&2), Some(&0.3));
    }

    #[test]
    fn test_parse_scores_extracts_from_prose() {
        let scores =
            parse_scores("Here you go:\n{\"scores\":[{\"idx\":0,\"score\":0.6}]}\nThanks").unwrap();
        assert_eq!(scores.get(&0), Some(&0.6));
    }

    #[test]
    fn test_parse_scores_rejects_garbage() {
        assert!(parse_scores("no json here").is_err());
        assert!(parse_scores(r#"{"ranking": []}"#).is_err());
    }

    #[test]
    fn test_prompt_truncates_candidates() {
        let mut doc = Document::new("x".repeat(2_000), 1.0);
        doc.metadata.insert("title".to_string(), json!("y".repeat(2_000)));
        let prompt = build_user_prompt("q", &[doc], "bm25");
        assert!(prompt.starts_with("Query: q\nGroup: bm25\nCandidates:\n0: "));
        assert!(prompt.len() < 1_200 * 3);
        assert!(prompt.contains(" | metadata: "));
    }
}
