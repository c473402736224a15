//! Query boundary: process state plus the question-answering entry points
//!
//! The service owns the pipeline, the synthesizer and the built index. It
//! moves through `uninitialized → loading → ready | degraded` exactly once;
//! query failures never change the state.

mod tool;

pub use tool::{DocumentTool, ToolDefinition};

use crate::config::Config;
use crate::embedding::{create_embedder, ScoredChunk, SimilarityIndex, VectorIndex};
use crate::error::{ErrorKind, FolioError, Result};
use crate::extraction::{Document, TextExtractor};
use crate::retrieval::RetrievalPipeline;
use crate::synthesis::{create_model, AnswerSynthesizer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::Instrument;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Uninitialized,
    Loading,
    Ready,
    Degraded,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessState::Uninitialized => "uninitialized",
            ProcessState::Loading => "loading",
            ProcessState::Ready => "ready",
            ProcessState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

enum Stage {
    Uninitialized,
    Loading,
    Ready {
        document_id: String,
        index: Arc<VectorIndex>,
    },
    Degraded {
        reason: String,
    },
}

impl Stage {
    fn state(&self) -> ProcessState {
        match self {
            Stage::Uninitialized => ProcessState::Uninitialized,
            Stage::Loading => ProcessState::Loading,
            Stage::Ready { .. } => ProcessState::Ready,
            Stage::Degraded { .. } => ProcessState::Degraded,
        }
    }
}

/// Incoming question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// Parse a request mapping; anything but an object with an optional
    /// string `query` is an invalid argument
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(FolioError::InvalidArgument(
                "request must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value.clone())
            .map_err(|_| FolioError::InvalidArgument("'query' must be a string".to_string()))
    }

    fn validated(&self) -> Result<&str> {
        let query = self
            .query
            .as_deref()
            .ok_or_else(|| FolioError::InvalidArgument("missing 'query' field".to_string()))?;

        if query.trim().is_empty() {
            return Err(FolioError::InvalidArgument(
                "'query' must not be empty".to_string(),
            ));
        }

        Ok(query)
    }
}

/// Answer or user-facing error text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

/// Explicitly constructed process context shared by the server and the tool
pub struct QueryService {
    pipeline: RetrievalPipeline,
    synthesizer: AnswerSynthesizer,
    stage: RwLock<Stage>,
}

impl QueryService {
    pub fn new(pipeline: RetrievalPipeline, synthesizer: AnswerSynthesizer) -> Self {
        Self {
            pipeline,
            synthesizer,
            stage: RwLock::new(Stage::Uninitialized),
        }
    }

    /// Wire up embedder, model, pipeline and synthesizer from configuration
    ///
    /// Nothing touches the network or loads a model here; that happens on
    /// first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_model(&config.llm)?;
        let pipeline = RetrievalPipeline::from_config(config, embedder)?;
        Ok(Self::new(pipeline, AnswerSynthesizer::new(model)))
    }

    pub fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    pub async fn state(&self) -> ProcessState {
        self.stage.read().await.state()
    }

    /// One-line description of the current state
    pub async fn describe(&self) -> String {
        match &*self.stage.read().await {
            Stage::Uninitialized => "No document loaded".to_string(),
            Stage::Loading => "Loading document".to_string(),
            Stage::Ready { document_id, index } => {
                format!("Ready: {} ({} chunks indexed)", document_id, index.len())
            }
            // The reason may carry internal detail; it is logged, not shown
            Stage::Degraded { .. } => "Degraded: the document failed to load".to_string(),
        }
    }

    /// Extract the document at `path` and ingest it
    ///
    /// Ingestion failures are absorbed into `Degraded` and the resulting
    /// state is returned. Only a repeated load is an error.
    pub async fn load(&self, extractor: &dyn TextExtractor, path: &Path) -> Result<ProcessState> {
        self.begin_loading().await?;
        tracing::info!("Extracting {:?} with {} extractor", path, extractor.name());

        match extractor.extract(path).await {
            Ok(document) => Ok(self.finish_loading(document).await),
            Err(e) => Ok(self.degrade(e.into()).await),
        }
    }

    /// Ingest already-extracted text
    pub async fn load_document(&self, document: Document) -> Result<ProcessState> {
        self.begin_loading().await?;
        Ok(self.finish_loading(document).await)
    }

    async fn begin_loading(&self) -> Result<()> {
        let mut stage = self.stage.write().await;
        if !matches!(*stage, Stage::Uninitialized) {
            return Err(FolioError::InvalidArgument(format!(
                "document already loaded (state: {}); restart to load another",
                stage.state()
            )));
        }

        *stage = Stage::Loading;
        Ok(())
    }

    async fn finish_loading(&self, document: Document) -> ProcessState {
        match self.pipeline.ingest(&document).await {
            Ok(index) => {
                tracing::info!("Document {} ready ({} chunks)", document.id, index.len());
                *self.stage.write().await = Stage::Ready {
                    document_id: document.id,
                    index: Arc::new(index),
                };
                ProcessState::Ready
            }
            Err(e) => self.degrade(e).await,
        }
    }

    async fn degrade(&self, error: FolioError) -> ProcessState {
        tracing::error!("Ingestion failed, serving in degraded mode: {}", error);
        *self.stage.write().await = Stage::Degraded {
            reason: error.to_string(),
        };
        ProcessState::Degraded
    }

    /// Published index, or `IndexNotReady` in any state but ready
    async fn index(&self) -> Result<Arc<VectorIndex>> {
        match &*self.stage.read().await {
            Stage::Ready { index, .. } => Ok(Arc::clone(index)),
            Stage::Degraded { reason } => {
                tracing::debug!("Rejecting query, degraded: {}", reason);
                Err(FolioError::IndexNotReady("ingestion failed".to_string()))
            }
            other => Err(FolioError::IndexNotReady(format!(
                "state is {}",
                other.state()
            ))),
        }
    }

    /// Answer a question, returning typed errors
    pub async fn ask(&self, query: &str) -> Result<String> {
        let request = QueryRequest::new(query);
        let query = request.validated()?;

        let index = self.index().await?;
        let context = self.pipeline.retrieve(index.as_ref(), query, None).await?;
        self.synthesizer.answer(query, &context).await
    }

    /// Ranked chunks for a question without synthesis
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let request = QueryRequest::new(query);
        let query = request.validated()?;

        let index = self.index().await?;
        let k = k.unwrap_or(self.pipeline.options().top_k);
        self.pipeline.search(index.as_ref(), query, k).await
    }

    /// Request/response boundary: every failure becomes response text
    pub async fn handle(&self, request: QueryRequest) -> QueryResponse {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("query", %request_id);

        async move {
            let started = std::time::Instant::now();
            let result = match request.validated() {
                Ok(query) => self.ask(query).await,
                Err(e) => Err(e),
            };

            let response = match result {
                Ok(answer) => {
                    tracing::info!("Answered in {}ms", started.elapsed().as_millis());
                    answer
                }
                Err(e) => {
                    match e.kind() {
                        ErrorKind::InvalidArgument | ErrorKind::IndexNotReady => {
                            tracing::info!("Query rejected: {}", e)
                        }
                        ErrorKind::DimensionMismatch | ErrorKind::Internal => {
                            tracing::error!("Query failed: {}", e)
                        }
                        _ => tracing::warn!("Query failed: {}", e),
                    }
                    e.user_message()
                }
            };

            QueryResponse { response }
        }
        .instrument(span)
        .await
    }

    /// Boundary over a raw JSON mapping
    pub async fn handle_json(&self, value: &serde_json::Value) -> QueryResponse {
        match QueryRequest::from_value(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::info!("Malformed request: {}", e);
                QueryResponse {
                    response: e.user_message(),
                }
            }
        }
    }
}
