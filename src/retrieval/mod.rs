//! Retrieval: ingestion into a vector index and query-time context assembly
//!
//! Search is dense-only. The ranked chunks are joined in rank order into the
//! context passed to answer synthesis.

mod pipeline;

pub use pipeline::{PipelineOptions, RetrievalPipeline};

use crate::embedding::ScoredChunk;

/// How ranked chunks are joined into one context string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub separator: String,
    /// Upper bound on the context length in characters
    pub max_chars: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            separator: "\n\n".to_string(),
            max_chars: None,
        }
    }
}

/// Join chunk texts in rank order
///
/// With a character limit, chunks are appended while the context stays
/// within it and assembly stops at the first one that does not fit. The top
/// chunk is always kept, even when it alone exceeds the limit.
pub fn assemble_context(results: &[ScoredChunk], options: &ContextOptions) -> String {
    let separator_len = options.separator.chars().count();
    let mut context = String::new();
    let mut used = 0;

    for (i, result) in results.iter().enumerate() {
        let len = result.chunk.char_len();

        if i > 0 {
            if let Some(max) = options.max_chars {
                if used + separator_len + len > max {
                    tracing::debug!("Context limit reached after {} of {} chunks", i, results.len());
                    break;
                }
            }
            context.push_str(&options.separator);
            used += separator_len;
        }

        context.push_str(&result.chunk.text);
        used += len;
    }

    context
}
