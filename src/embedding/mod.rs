/// Embedding & indexing
///
/// - `Embedder` trait for abstraction over embedding backends
/// - `FastEmbedProvider` for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - `GeminiEmbedder` for the hosted Gemini embedding models (768-dim)
/// - `VectorIndex` for exact cosine-similarity search
mod gemini;
mod provider;
mod vector_index;

pub use gemini::{GeminiEmbedder, MAX_BATCH as GEMINI_MAX_BATCH};
pub use provider::{Embedder, EmbeddingError, FastEmbedProvider};
pub use vector_index::{ScoredChunk, SimilarityIndex, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use std::sync::Arc;
use std::time::Duration;

/// Build the embedder named in the configuration
///
/// Construction is cheap; the model or client behind it is initialised on
/// first use.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        "gemini" => Ok(Arc::new(
            GeminiEmbedder::new(&config.model, &config.endpoint, &config.api_key_env)?
                .with_timeout(Duration::from_secs(config.timeout_secs)),
        )),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unsupported embedding provider: {}",
            other
        ))),
    }
}
