use tracing_subscriber::EnvFilter;

use hybrid_search::api;
use hybrid_search::config::Config;
use hybrid_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "Embedding provider: {} ({})",
        config.embedding.api_base.as_deref().unwrap_or("<unset>"),
        config.embedding.model
    );
    if config.embedding.api_base.is_none() {
        tracing::warn!("EMBEDDING_API_BASE is not set; the vector branch will return no results");
    }

    let state = AppState::new(config.clone())?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
