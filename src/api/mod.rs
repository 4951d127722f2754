//! Axum HTTP surface.

pub mod documents;
pub mod health;
pub mod search;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::error::SearchError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/embedding_test", get(health::embedding_test))
        .route("/api/search", post(search::search))
        .route("/api/hybrid_search", post(search::hybrid_search))
        .route("/api/documents", post(documents::ingest))
        .route("/api/documents/{id}", delete(documents::delete))
        .with_state(state)
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = match &self {
            SearchError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
