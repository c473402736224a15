/// Tests against real embedding models
///
/// These download a model or call a hosted API, so they are ignored by
/// default: run with `cargo test -- --ignored`.
use folio::chunking::Chunker;
use folio::embedding::{Embedder, FastEmbedProvider, GeminiEmbedder, SimilarityIndex};
use folio::extraction::Document;
use folio::retrieval::{PipelineOptions, RetrievalPipeline};
use std::sync::Arc;

const DOCUMENT: &str = "Paris is the capital of France. Lyon is a city in France.\n\n\
The Loire is the longest river in France. It flows into the Atlantic Ocean.\n\n\
Mont Blanc is the highest mountain in the Alps.";

#[tokio::test]
#[ignore] // Requires model download (~90MB)
async fn test_fastembed_retrieval() {
    let embedder = Arc::new(FastEmbedProvider::with_default_model().unwrap());
    assert!(!embedder.is_initialized());

    let pipeline = RetrievalPipeline::new(
        Chunker::new(80, 10).unwrap(),
        embedder.clone(),
        PipelineOptions::default(),
    )
    .unwrap();

    let index = pipeline
        .ingest(&Document::new("geography", DOCUMENT))
        .await
        .unwrap();
    assert!(embedder.is_initialized());
    assert_eq!(index.dimension(), Some(384));

    let results = pipeline
        .search(&index, "Which river is the longest?", 1)
        .await
        .unwrap();
    assert!(results[0].chunk.text.contains("Loire"));

    let results = pipeline
        .search(&index, "What is the capital of France?", 1)
        .await
        .unwrap();
    assert!(results[0].chunk.text.contains("Paris"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires model download (~90MB)
async fn test_fastembed_concurrent_first_use() {
    let embedder = Arc::new(FastEmbedProvider::with_default_model().unwrap());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let embedder = Arc::clone(&embedder);
            tokio::spawn(async move { embedder.embed("capital of France").await })
        })
        .collect();

    let mut vectors = Vec::new();
    for task in tasks {
        vectors.push(task.await.unwrap().unwrap());
    }
    assert!(embedder.is_initialized());
    for vector in &vectors[1..] {
        let drift = vector
            .iter()
            .zip(&vectors[0])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(drift < 1e-5);
    }
}

#[tokio::test]
#[ignore] // Requires GOOGLE_API_KEY and network access
async fn test_gemini_embeddings() {
    let embedder = GeminiEmbedder::new(
        "text-embedding-004",
        folio::config::GEMINI_ENDPOINT,
        "GOOGLE_API_KEY",
    )
    .unwrap();

    let vectors = embedder
        .embed_many(&["Paris".to_string(), "Lyon".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].len(), embedder.dimension());
}
