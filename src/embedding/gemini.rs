/// Remote embeddings through the Gemini `batchEmbedContents` API
use super::provider::{validate_embeddings, Embedder, EmbeddingError};
use crate::config::read_api_key;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Largest batch the API accepts in one request
pub const MAX_BATCH: usize = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

struct Session {
    client: Client,
    api_key: String,
}

/// Gemini embedding provider
///
/// The HTTP client and the API key are resolved on first use.
pub struct GeminiEmbedder {
    session: OnceCell<Session>,
    endpoint: String,
    model: String,
    api_key_env: String,
    dimension: usize,
    timeout: Duration,
}

impl GeminiEmbedder {
    pub fn new(model: &str, endpoint: &str, api_key_env: &str) -> Result<Self, EmbeddingError> {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        let dimension = match model.as_str() {
            "models/embedding-001" | "models/text-embedding-004" => 768,
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: embedding-001, text-embedding-004",
                    model
                )));
            }
        };

        Ok(Self {
            session: OnceCell::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key_env: api_key_env.to_string(),
            dimension,
            timeout: Duration::from_secs(60),
        })
    }

    /// Override the per-request timeout (60s by default)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn session(&self) -> Result<&Session, EmbeddingError> {
        self.session
            .get_or_try_init(|| async {
                let api_key = read_api_key(&self.api_key_env).ok_or_else(|| {
                    EmbeddingError::InitializationError(format!(
                        "environment variable {} is not set",
                        self.api_key_env
                    ))
                })?;

                let client = Client::builder()
                    .timeout(self.timeout)
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

                tracing::info!("Gemini embedding client ready: {}", self.model);
                Ok::<_, EmbeddingError>(Session { client, api_key })
            })
            .await
    }

    async fn request(
        &self,
        texts: &[String],
        task_type: &'static str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let session = self.session().await?;
        let url = format!("{}/{}:batchEmbedContents", self.endpoint, self.model);

        let body = BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model,
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let response = session
            .client
            .post(&url)
            .header("x-goog-api-key", &session.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::GenerationError(format!(
                "embedding service returned {}",
                status
            )));
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.without_url().to_string()))?;

        let embeddings: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
        validate_embeddings(&embeddings, texts.len(), self.dimension)?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self
            .request(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("No embeddings generated".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            embeddings.extend(self.request(batch, "RETRIEVAL_DOCUMENT").await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
