use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

use crate::error::Result;
use crate::llm::embeddings::EmbeddingProvider;
use crate::state::AppState;

/// GET /health - Both stores must be readable.
pub async fn health(State(state): State<AppState>) -> Response {
    let bm25 = state.bm25.clone();
    let documents = tokio::task::spawn_blocking(move || bm25.num_docs())
        .await
        .context("Health check task failed")
        .and_then(|r| r);

    match documents {
        Ok(documents) => Json(json!({
            "status": "ok",
            "documents": documents,
            "vectors": state.vectors.entry_count(),
            "reranker": state.engine.reranker().scorer_name(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {e:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "search index unreachable" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingTestParams {
    #[serde(default = "default_probe_text")]
    pub text: String,
}

fn default_probe_text() -> String {
    "hello world".to_string()
}

/// GET /api/embedding_test?text= - Round-trip one text through the embedding provider.
pub async fn embedding_test(
    State(state): State<AppState>,
    Query(params): Query<EmbeddingTestParams>,
) -> Result<Json<serde_json::Value>> {
    let start = Instant::now();
    let vector = state.embedder.embed(&params.text).await?;
    Ok(Json(json!({
        "ok": true,
        "model": state.embedder.model(),
        "base": state.embedder.api_base(),
        "length": vector.len(),
        "timing_ms": start.elapsed().as_secs_f64() * 1000.0,
    })))
}
