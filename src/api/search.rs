use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::models::{
    default_bm25_ratio, Branch, HybridSearchRequest, SearchRequest, SearchResponse,
};
use crate::search::dedup::{deduplicate_and_trim, prepare_document};
use crate::search::hybrid::HybridResponse;
use crate::search::LexicalSearch;
use crate::state::AppState;
use crate::text::normalize_query_text;

/// Resolve the effective limit: absent means the configured default.
pub fn validate_limit(limit: Option<i64>, config: &SearchConfig) -> Result<i64> {
    let limit = limit.unwrap_or(config.default_limit);
    if limit <= 0 {
        return Err(SearchError::invalid("limit must be > 0"));
    }
    if limit > config.max_limit {
        return Err(SearchError::invalid(format!(
            "limit must be <= {}",
            config.max_limit
        )));
    }
    Ok(limit)
}

pub fn validate_ratio(ratio: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(SearchError::invalid("bm25_ratio must be between 0 and 1"));
    }
    Ok(ratio)
}

fn validate_query(query: &str) -> Result<String> {
    let query = normalize_query_text(query);
    if query.is_empty() {
        return Err(SearchError::invalid("query must not be empty"));
    }
    Ok(query)
}

/// POST /api/search - Lexical-only search, deduplicated and trimmed to `limit`.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let limit = validate_limit(req.limit, &state.config.search)? as usize;
    let query = validate_query(&req.query)?;

    let branch = LexicalSearch::search(state.bm25.as_ref(), &query, limit).await?;
    let results = deduplicate_and_trim(branch.documents, limit)
        .into_iter()
        .map(|doc| prepare_document(doc, Branch::Bm25))
        .collect();

    Ok(Json(SearchResponse {
        results,
        total_count: branch.total,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct HybridParamsQuery {
    pub bm25_ratio: Option<f64>,
}

/// POST /api/hybrid_search - Lexical + vector fan-out with reranking.
///
/// `bm25_ratio` may be given in the body or as a query parameter; the body wins.
pub async fn hybrid_search(
    State(state): State<AppState>,
    Query(params): Query<HybridParamsQuery>,
    Json(req): Json<HybridSearchRequest>,
) -> Result<Json<HybridResponse>> {
    let limit = validate_limit(req.limit, &state.config.search)?;
    let query = validate_query(&req.query)?;
    let ratio = validate_ratio(
        req.bm25_ratio
            .or(params.bm25_ratio)
            .unwrap_or_else(default_bm25_ratio),
    )?;

    let response = state.engine.search(&query, limit, ratio).await?;
    Ok(Json(response))
}
