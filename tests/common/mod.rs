// Shared in-process mocks for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use folio::chunking::Chunker;
use folio::embedding::{Embedder, EmbeddingError};
use folio::retrieval::{PipelineOptions, RetrievalPipeline};
use folio::service::QueryService;
use folio::synthesis::{AnswerSynthesizer, ChatMessage, GenerationError, GenerativeModel};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const PARIS_DOCUMENT: &str = "Paris is the capital of France. Lyon is a city in France.";

pub const DIMENSION: usize = 256;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `DIMENSION` buckets
pub struct MockEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    declared_dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::declaring(DIMENSION)
    }

    /// An embedder whose `dimension()` disagrees with the vectors it returns
    pub fn declaring(declared_dimension: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            declared_dimension,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[bucket(&word.to_lowercase())] += 1.0;
        }
        vector
    }

    fn check(&self) -> Result<(), EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::GenerationError(
                "connection refused (10.1.2.3:443)".to_string(),
            ));
        }
        Ok(())
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.check()?;
        Ok(Self::vector(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.check()?;
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.declared_dimension
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}

/// Answers from the context the way a well-behaved model would
pub struct MockModel {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Status { status: 503 });
        }

        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let context = prompt
            .split("--Question--")
            .next()
            .unwrap_or("");

        if context.contains("Paris") {
            Ok("Paris is the capital of France.".to_string())
        } else {
            Ok("I don't know".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

pub struct Harness {
    pub service: Arc<QueryService>,
    pub embedder: Arc<MockEmbedder>,
    pub model: Arc<MockModel>,
}

/// Service over the mocks with chunk size 40, overlap 10 and top-k 1
pub fn harness() -> Harness {
    harness_with(Arc::new(MockEmbedder::new()))
}

pub fn harness_with(embedder: Arc<MockEmbedder>) -> Harness {
    let model = Arc::new(MockModel::new());
    let options = PipelineOptions {
        batch_size: 8,
        top_k: 1,
        ..PipelineOptions::default()
    };
    let pipeline = RetrievalPipeline::new(
        Chunker::new(40, 10).unwrap(),
        embedder.clone(),
        options,
    )
    .unwrap();

    let service = QueryService::new(pipeline, AnswerSynthesizer::new(model.clone()));

    Harness {
        service: Arc::new(service),
        embedder,
        model,
    }
}
