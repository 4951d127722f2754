use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::error::{Result, SearchError};
use crate::llm::embeddings::EmbeddingProvider;
use crate::models::{IngestRequest, IngestResponse, StoredDocument};
use crate::state::AppState;
use crate::text::sanitize_map;

/// POST /api/documents - Index documents into both stores.
///
/// The lexical commit is the point of no return. Embedding or vector-store
/// failures after it leave the affected documents lexical-only, reported via
/// `vectors` and `embedded: false`.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    if req.documents.is_empty() {
        return Err(SearchError::invalid("documents must not be empty"));
    }

    let docs: Vec<StoredDocument> = req
        .documents
        .into_iter()
        .map(|doc| StoredDocument {
            id: doc
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            content: doc.content,
            metadata: sanitize_map(doc.metadata),
        })
        .collect();

    let bm25 = state.bm25.clone();
    let batch = docs.clone();
    tokio::task::spawn_blocking(move || bm25.index_documents(&batch))
        .await
        .context("Indexing task failed")??;

    let with_content = docs.iter().filter(|d| !d.content.trim().is_empty()).count();
    let (embedded_docs, embeddings) = embed_documents(state.embedder.as_ref(), &docs).await;

    let mut vectors = embedded_docs.len();
    if vectors > 0 {
        let store = state.vectors.clone();
        let stored =
            tokio::task::spawn_blocking(move || store.add_documents(&embedded_docs, embeddings))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|added| added);
        if let Err(e) = stored {
            tracing::warn!(
                "Vector store rejected {vectors} document(s), indexed lexically only: {e:#}"
            );
            vectors = 0;
        }
    }
    let embedded = vectors > 0 && vectors == with_content;

    tracing::info!(
        "Ingested {} document(s) ({vectors} with vectors, embedded: {embedded})",
        docs.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            indexed: docs.len(),
            ids: docs.into_iter().map(|d| d.id).collect(),
            vectors,
            embedded,
        }),
    ))
}

/// Embed each document on its own. Empty bodies are skipped and failures
/// only drop the failing document.
async fn embed_documents(
    embedder: &dyn EmbeddingProvider,
    docs: &[StoredDocument],
) -> (Vec<StoredDocument>, Vec<Vec<f32>>) {
    let mut embedded = Vec::with_capacity(docs.len());
    let mut embeddings = Vec::with_capacity(docs.len());
    let mut failed = 0;

    for doc in docs.iter().filter(|d| !d.content.trim().is_empty()) {
        match embedder.embed_document(&doc.content).await {
            Ok(embedding) => {
                embedded.push(doc.clone());
                embeddings.push(embedding);
            }
            Err(e) => {
                failed += 1;
                tracing::debug!("Embedding failed for document {}: {e}", doc.id);
                if failed == 1 {
                    tracing::warn!("Embedding failed, document(s) stay lexical-only: {e}");
                }
            }
        }
    }
    if failed > 1 {
        tracing::warn!("Embedding failed for {failed} document(s) in this batch");
    }

    (embedded, embeddings)
}

/// DELETE /api/documents/{id} - Remove a document from both stores.
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let bm25 = state.bm25.clone();
    let doc_id = id.clone();
    tokio::task::spawn_blocking(move || bm25.delete_document(&doc_id))
        .await
        .context("Delete task failed")??;

    let store = state.vectors.clone();
    let doc_id = id.clone();
    let had_vector = tokio::task::spawn_blocking(move || store.delete_document(&doc_id))
        .await
        .context("Vector delete task failed")??;
    tracing::info!("Deleted document {id} (vector entry: {had_vector})");
    Ok(StatusCode::NO_CONTENT)
}
