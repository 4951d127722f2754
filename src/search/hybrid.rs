//! Result assembly for hybrid search.
//!
//! Pipeline per request:
//! 1. normalize the query; `limit <= 0` short-circuits to an empty response
//! 2. fan out to both branches ([`FanOut`])
//! 3. normalize scores within each branch
//! 4. dedup, lexical first, so overlapping hits are attributed to `bm25`
//! 5. rerank each branch against its own budget
//! 6. tag `source` and `final_score`, stable sort, trim to `limit`

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::Instrument;

use crate::context::{log_stage, RequestContext};
use crate::error::{Result, SearchError};
use crate::llm::rerank::Reranker;
use crate::models::{Branch, Document};
use crate::search::dedup::{dedup_branches, prepare_document};
use crate::search::fanout::{elapsed_ms, BranchBudget, FanOut, FanOutOutcome};
use crate::search::scores::normalize_scores;
use crate::search::BranchResult;
use crate::text::normalize_query_text;

const STAGES: [&str; 5] = ["bm25_ms", "vector_ms", "normalize_ms", "dedup_ms", "groq_ms"];

/// Per-stage elapsed milliseconds. Empty for short-circuited requests; otherwise
/// every stage is present (0 when it did not run) plus `total_ms`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Timings(BTreeMap<String, f64>);

impl Timings {
    pub fn record(&mut self, stage: &str, ms: f64) {
        *self.0.entry(stage.to_string()).or_insert(0.0) += ms;
    }

    pub fn get(&self, stage: &str) -> Option<f64> {
        self.0.get(stage).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill missing stages with 0 and add `total_ms` as the sum of the stages.
    fn finish(&mut self) {
        let mut total = 0.0;
        for stage in STAGES {
            total += *self.0.entry(stage.to_string()).or_insert(0.0);
        }
        self.0.insert("total_ms".to_string(), total);
    }
}

/// Effective split and collaborators used for a request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SplitParams {
    pub bm25_ratio: f64,
    pub bm25_final: usize,
    pub vector_final: usize,
    pub bm25_fetch: usize,
    pub vector_fetch: usize,
    pub vector_operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HybridParams {
    pub query: String,
    pub limit: i64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitParams>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridResponse {
    pub results: Vec<Document>,
    /// Larger of the two branches' reported totals. An upper bound, not a
    /// count of the deduplicated universe.
    pub total_count: usize,
    pub params: HybridParams,
    pub timings: Timings,
}

impl HybridResponse {
    fn empty(query: String, limit: i64) -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            params: HybridParams {
                query,
                limit,
                split: None,
            },
            timings: Timings::default(),
        }
    }
}

/// Hybrid search engine: fan-out, merge and rerank.
#[derive(Clone)]
pub struct HybridSearch {
    fanout: FanOut,
    reranker: Reranker,
}

impl HybridSearch {
    pub fn new(fanout: FanOut, reranker: Reranker) -> Self {
        Self { fanout, reranker }
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    /// Run one hybrid search. Branch and scorer failures degrade the result;
    /// only a ratio outside `[0, 1]` is an error.
    pub async fn search(&self, query: &str, limit: i64, bm25_ratio: f64) -> Result<HybridResponse> {
        if !(0.0..=1.0).contains(&bm25_ratio) {
            return Err(SearchError::invalid("bm25_ratio must be between 0 and 1"));
        }

        let query = normalize_query_text(query);
        if limit <= 0 {
            return Ok(HybridResponse::empty(query, limit));
        }

        let ctx = RequestContext::new(&query, limit);
        let span = ctx.span();
        Ok(self.run(&ctx, limit as usize, bm25_ratio).instrument(span).await)
    }

    async fn run(&self, ctx: &RequestContext, limit: usize, bm25_ratio: f64) -> HybridResponse {
        let query = ctx.query.as_str();
        let budget = BranchBudget::split(limit, bm25_ratio);
        let mut timings = Timings::default();

        let FanOutOutcome {
            lexical,
            vector,
            lexical_ms,
            vector_ms,
            wall_ms,
        } = self.fanout.run(query, &budget).await;
        timings.record("bm25_ms", lexical_ms);
        timings.record("vector_ms", vector_ms);

        let BranchResult {
            documents: mut bm25_docs,
            total: bm25_total,
            ..
        } = lexical;
        let BranchResult {
            documents: mut vector_docs,
            total: vector_total,
            operator: vector_operator,
        } = vector;

        log_stage(ctx, "docs_fetched", bm25_docs.iter().chain(&vector_docs), Some(wall_ms));
        log_stage(ctx, "bm25", &bm25_docs, Some(lexical_ms));
        log_stage(ctx, "vector", &vector_docs, Some(vector_ms));

        let start = Instant::now();
        normalize_scores(&mut bm25_docs);
        normalize_scores(&mut vector_docs);
        timings.record("normalize_ms", elapsed_ms(start));

        let start = Instant::now();
        let (bm25_unique, vector_unique) = dedup_branches(bm25_docs, vector_docs);
        let dedup_ms = elapsed_ms(start);
        timings.record("dedup_ms", dedup_ms);
        log_stage(ctx, "dedup", bm25_unique.iter().chain(&vector_unique), Some(dedup_ms));

        let start = Instant::now();
        let bm25_ranked = self
            .reranker
            .rerank(query, bm25_unique, budget.desired_lexical, Branch::Bm25.as_str())
            .await;
        let vector_ranked = self
            .reranker
            .rerank(query, vector_unique, budget.desired_vector, Branch::Vector.as_str())
            .await;
        let groq_ms = elapsed_ms(start);
        timings.record("groq_ms", groq_ms);

        let split = SplitParams {
            bm25_ratio,
            bm25_final: bm25_ranked.len(),
            vector_final: vector_ranked.len(),
            bm25_fetch: budget.fetch_lexical,
            vector_fetch: budget.fetch_vector,
            vector_operator,
            groq_model: self.reranker.scorer_name().map(str::to_string),
        };

        let mut results: Vec<Document> = bm25_ranked
            .into_iter()
            .map(|doc| finalize(doc, Branch::Bm25))
            .chain(vector_ranked.into_iter().map(|doc| finalize(doc, Branch::Vector)))
            .collect();
        // Stable: ties keep lexical-then-vector order
        results.sort_by(|a, b| {
            b.best_score()
                .partial_cmp(&a.best_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        log_stage(ctx, "rerank", &results, Some(groq_ms));

        timings.finish();
        let total_count = bm25_total.max(vector_total);

        tracing::info!(
            request_id = %ctx.request_id,
            bm25_ratio,
            bm25_final = split.bm25_final,
            vector_final = split.vector_final,
            bm25_fetch = split.bm25_fetch,
            vector_fetch = split.vector_fetch,
            vector_operator = split.vector_operator.as_deref().unwrap_or("none"),
            returned = results.len(),
            total_count,
            total_ms = timings.get("total_ms").unwrap_or_default(),
            "hybrid search complete"
        );

        HybridResponse {
            results,
            total_count,
            params: HybridParams {
                query: query.to_string(),
                limit: limit as i64,
                split: Some(split),
            },
            timings,
        }
    }
}

fn finalize(doc: Document, source: Branch) -> Document {
    let mut doc = prepare_document(doc, source);
    doc.final_score = Some(doc.groq_score.unwrap_or(doc.score));
    doc
}
