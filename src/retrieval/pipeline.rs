//! Build-time ingestion and query-time retrieval

use super::{assemble_context, ContextOptions};
use crate::chunking::Chunker;
use crate::config::Config;
use crate::embedding::{Embedder, EmbeddingError, ScoredChunk, SimilarityIndex, VectorIndex, VectorIndexError};
use crate::error::{FolioError, Result};
use crate::extraction::Document;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Tunables for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Chunks per `embed_many` call during ingestion
    pub batch_size: usize,
    /// Default number of chunks per query
    pub top_k: usize,
    pub context: ContextOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            top_k: 4,
            context: ContextOptions::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.embedding.batch_size,
            top_k: config.retrieval.top_k,
            context: ContextOptions {
                separator: config.retrieval.context_separator.clone(),
                max_chars: config.retrieval.max_context_chars,
            },
        }
    }
}

/// Chunker → Embedder → VectorIndex at build time,
/// Embedder → index search → context assembly at query time
pub struct RetrievalPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    options: PipelineOptions,
}

impl RetrievalPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        options: PipelineOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(FolioError::InvalidArgument(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if options.top_k == 0 {
            return Err(FolioError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            chunker,
            embedder,
            options,
        })
    }

    /// Pipeline with the chunking and retrieval settings from `config`
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let chunker = Chunker::with_separators(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
            &config.chunking.separators,
        )?;
        Self::new(chunker, embedder, PipelineOptions::from_config(config))
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Chunk, embed and index a document
    ///
    /// An empty document yields an empty index without calling the embedder.
    pub async fn ingest(&self, document: &Document) -> Result<VectorIndex> {
        let start = Instant::now();
        let chunks = self.chunker.split(&document.text);

        info!(
            "Ingesting document {} ({} chars, {} chunks)",
            document.id,
            document.char_len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        let batches = texts.len().div_ceil(self.options.batch_size);

        for (i, batch) in texts.chunks(self.options.batch_size).enumerate() {
            let embedded = self.embedder.embed_many(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::Malformed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                ))
                .into());
            }
            vectors.extend(embedded);
            debug!("Embedded batch {}/{}", i + 1, batches);
        }

        let index = VectorIndex::build(vectors.into_iter().zip(chunks).collect())?;

        if let Some(actual) = index.dimension() {
            let expected = self.embedder.dimension();
            if actual != expected {
                return Err(FolioError::DimensionMismatch { expected, actual });
            }
        }

        info!(
            "Built index of {} entries with {} in {}ms",
            index.len(),
            self.embedder.model_name(),
            start.elapsed().as_millis()
        );

        Ok(index)
    }

    /// Ranked chunks for a query
    ///
    /// An empty index fails with `IndexNotReady` before the embedder is
    /// called.
    pub async fn search(
        &self,
        index: &dyn SimilarityIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(FolioError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }

        if index.is_empty() {
            return Err(FolioError::IndexNotReady(
                "the index holds no entries".to_string(),
            ));
        }

        let query_vector = self.embedder.embed(query).await?;

        index.search(&query_vector, k).map_err(|e| {
            if let VectorIndexError::InvalidDimension { expected, actual } = e {
                error!(
                    "Query vector from {} has dimension {}, index expects {}",
                    self.embedder.model_name(),
                    actual,
                    expected
                );
            }
            e.into()
        })
    }

    /// Context string for a query, `k` defaulting to `top_k`
    pub async fn retrieve(
        &self,
        index: &dyn SimilarityIndex,
        query: &str,
        k: Option<usize>,
    ) -> Result<String> {
        let k = k.unwrap_or(self.options.top_k);
        let results = self.search(index, query, k).await?;

        debug!(
            "Retrieved {} chunks, top score {:.3}",
            results.len(),
            results.first().map(|r| r.score).unwrap_or_default()
        );

        Ok(assemble_context(&results, &self.options.context))
    }
}
