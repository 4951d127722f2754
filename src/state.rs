use std::sync::Arc;

use crate::config::Config;
use crate::llm::embeddings::{EmbeddingCache, EmbeddingClient};
use crate::llm::rerank::Reranker;
use crate::search::bm25::Bm25Index;
use crate::search::fanout::FanOut;
use crate::search::hybrid::HybridSearch;
use crate::search::vector::VectorStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub bm25: Arc<Bm25Index>,
    pub vectors: Arc<VectorStore>,
    pub embedder: Arc<EmbeddingClient>,
    pub engine: Arc<HybridSearch>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(config.index_dir())?;
        std::fs::create_dir_all(config.vector_dir())?;

        let bm25 = Arc::new(Bm25Index::open_or_create(&config.index_dir())?);
        let vectors = Arc::new(VectorStore::open_or_create_with_limit(
            &config.vector_dir(),
            config.max_vector_entries,
        )?);

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        // One cache per process, shared by every in-flight request
        let cache = Arc::new(EmbeddingCache::new(config.embedding.cache_capacity));
        let embedder = Arc::new(EmbeddingClient::new(
            http_client.clone(),
            config.embedding.clone(),
            cache,
        ));

        let fanout = FanOut::new(
            bm25.clone(),
            vectors.clone(),
            embedder.clone(),
            config.search.branch_timeout(),
        );
        let reranker = Reranker::from_config(http_client, &config.scorer);
        if let Some(model) = reranker.scorer_name() {
            tracing::info!("Groq reranking enabled with model {model}");
        } else {
            tracing::info!("Groq reranking disabled; using raw-score fallback");
        }

        Ok(Self {
            config,
            bm25,
            vectors,
            embedder,
            engine: Arc::new(HybridSearch::new(fanout, reranker)),
        })
    }
}
