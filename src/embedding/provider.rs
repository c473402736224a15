/// Embedder trait and FastEmbed implementation
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed embedding: {0}")]
    Malformed(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Maps text to fixed-dimension vectors
///
/// Implementations initialise their backing model lazily, exactly once, and
/// must never hand back a placeholder vector on failure.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one per input in the same order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Check a batch of vectors returned by a backend
pub(crate) fn validate_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::Malformed(format!(
            "expected {} embeddings, got {}",
            expected_count,
            embeddings.len()
        )));
    }

    for embedding in embeddings {
        if embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::Malformed(
                "embedding contains non-finite values".to_string(),
            ));
        }
    }

    Ok(())
}

/// FastEmbed provider for local embedding generation
///
/// The ONNX model is loaded on first use, not at construction, and then
/// shared for the lifetime of the process. Inference runs on the blocking
/// thread pool.
pub struct FastEmbedProvider {
    model: OnceCell<Arc<TextEmbedding>>,
    embedding_model: EmbeddingModel,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to the fastembed cache
    /// on first use. The smallest model (all-MiniLM-L6-v2) is ~90MB.
    /// - all-MiniLM-L6-v2: 90MB (384 dims) - recommended for most use cases
    /// - bge-small-en-v1.5: 130MB (384 dims) - better accuracy
    /// - bge-base-en-v1.5: 440MB (768 dims) - highest accuracy
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        Ok(Self {
            model: OnceCell::new(),
            embedding_model,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    /// Whether the model has been loaded yet
    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                tracing::info!(
                    "Initializing embedding model: {} ({}D, downloaded if not cached)",
                    self.model_name,
                    self.dimension
                );

                let embedding_model = self.embedding_model.clone();
                let model = tokio::task::spawn_blocking(move || {
                    TextEmbedding::try_new(
                        InitOptions::new(embedding_model).with_show_download_progress(true),
                    )
                })
                .await
                .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?
                .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

                Ok::<_, EmbeddingError>(Arc::new(model))
            })
            .await
            .cloned()
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.model().await?;
        let count = texts.len();

        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        validate_embeddings(&embeddings, count, self.dimension)?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self.run(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("No embeddings generated".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empties would shift positions, so reject instead
        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        self.run(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation_is_lazy() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");
        assert!(!provider.is_initialized());
    }

    #[test]
    fn test_unsupported_model() {
        let result = FastEmbedProvider::new("not-a-model");
        assert!(matches!(
            result,
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    fn test_validate_embeddings() {
        assert!(validate_embeddings(&[vec![0.1, 0.2]], 1, 2).is_ok());
        assert!(matches!(
            validate_embeddings(&[vec![0.1, 0.2]], 2, 2),
            Err(EmbeddingError::Malformed(_))
        ));
        assert!(matches!(
            validate_embeddings(&[vec![0.1]], 1, 2),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            validate_embeddings(&[vec![f32::NAN, 0.0]], 1, 2),
            Err(EmbeddingError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_model() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let embeddings = provider.embed_many(&[]).await.unwrap();
        assert!(embeddings.is_empty());
        assert!(!provider.is_initialized());
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_single_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let embedding = provider
            .embed("This is a test sentence for embedding.")
            .await
            .unwrap();
        assert_eq!(embedding.len(), 384);
        assert!(provider.is_initialized());

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.1);
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_batch_embedding_preserves_order() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            "Second test sentence.".to_string(),
            "Third test sentence.".to_string(),
        ];

        let batch = provider.embed_many(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);

        let second = provider.embed(&texts[1]).await.unwrap();
        let drift: f32 = batch[1]
            .iter()
            .zip(second.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(drift < 1e-3);
    }
}
