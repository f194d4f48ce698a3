//! Iris application binary - composition root.
//!
//! Ties the iris crates together into a single executable:
//! 1. Parse CLI args and load configuration from TOML
//! 2. Construct the embedding backend and resolve its output dimension
//! 3. Recreate the vector collection with that dimension
//! 4. Ingest the source image directory to completion
//! 5. Start the axum API server
//!
//! Ingestion is a blocking startup phase: the listener is only bound after
//! the collection is fully populated, so no query ever observes a
//! half-built index.

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use iris_api::{create_router, AppState};
use iris_core::config::{EmbeddingBackend, EmbeddingConfig, IrisConfig};
use iris_core::error::Result;
use iris_vector::collection::CollectionConfig;
use iris_vector::{
    resolve_dimension, ClipEmbedder, DynEmbedder, ImageIngestor, MockEmbedder, SearchService,
    VectorCollection,
};

use crate::cli::CliArgs;

/// Construct the embedding backend named in the configuration.
fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn DynEmbedder>> {
    match config.backend {
        EmbeddingBackend::Clip => Ok(Arc::new(ClipEmbedder::load(config)?)),
        EmbeddingBackend::Mock => {
            tracing::warn!("Using the mock embedder; results will not be semantic");
            Ok(Arc::new(MockEmbedder::new()))
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = IrisConfig::load_or_default(&config_file);

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    tracing::info!("Starting iris v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Embedder. Any failure here aborts startup: there is no degraded mode
    // without an embedding space.
    let embedder = build_embedder(&config.embedding)?;

    // Dimension. The collection below is configured with exactly this
    // value, so a stale dimension can never reach storage.
    let dimension = resolve_dimension(embedder.as_ref()).await?;
    tracing::info!(dimension, "Embedding dimension resolved");

    // Collection: dropped and recreated on every startup.
    let data_dir = Path::new(&config.storage.data_dir);
    let collection = VectorCollection::recreate(
        data_dir,
        CollectionConfig {
            name: config.storage.collection.clone(),
            dimension,
        },
    )?;

    // Ingestion runs to completion before the listener is bound.
    let source_dir = args.resolve_source_dir(&config.ingest.source_dir);
    let ingestor = ImageIngestor::new(collection.clone(), Arc::clone(&embedder));
    let summary = ingestor.ingest_dir(&source_dir).await?;
    tracing::info!(
        indexed = summary.indexed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Preloaded local images into the collection"
    );
    collection.flush()?;

    // API server.
    let search = SearchService::new(collection.clone(), embedder);
    let state = AppState::new(search, collection);
    let router = create_router(state, &source_dir, Path::new(&config.ingest.image_root));

    let port = args.resolve_port(config.general.port);
    let addr = format!("127.0.0.1:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind — is another instance running?");
            return Err(e.into());
        }
    };

    tracing::info!(addr = %addr, "API server listening");
    axum::serve(listener, router).await?;

    Ok(())
}
