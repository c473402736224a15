//! Recursive-boundary chunking with a sliding overlap
//!
//! A chunk ends at the last occurrence of the highest-priority separator that
//! fits in the window, falling back to a hard character cut. The next chunk
//! starts `chunk_overlap` characters before the previous one ended, so
//! consecutive chunks always share exactly that many characters. All lengths
//! and offsets count Unicode scalar values, not bytes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Invalid chunk configuration: {0}")]
    InvalidConfig(String),
}

/// A contiguous piece of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in document order (0-based)
    pub index: usize,
    /// Offset of the first character within the document
    pub start: usize,
    /// Chunk content
    pub text: String,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Offset one past the last character
    pub fn end(&self) -> usize {
        self.start + self.char_len()
    }
}

/// Cut points the chunker prefers, listed from coarse to fine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    /// Blank line between paragraphs
    Paragraph,
    /// Single line break
    Line,
    /// Sentence terminator followed by whitespace
    Sentence,
    /// Any whitespace run
    Word,
}

impl Separator {
    /// Default priority order
    pub fn default_priority() -> Vec<Separator> {
        vec![
            Separator::Paragraph,
            Separator::Line,
            Separator::Sentence,
            Separator::Word,
        ]
    }

    fn pattern(self) -> &'static str {
        match self {
            Separator::Paragraph => r"\n\s*\n",
            Separator::Line => r"\n",
            Separator::Sentence => r#"[.!?]+["')\]]*\s+"#,
            Separator::Word => r"\s+",
        }
    }
}

/// Splits document text into overlapping chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<(Separator, Regex)>,
}

impl Chunker {
    /// Create a chunker with the default separator priority
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        Self::with_separators(chunk_size, chunk_overlap, &Separator::default_priority())
    }

    /// Create a chunker with an explicit separator priority
    ///
    /// The plain-character cut is always the last resort and is not listed.
    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[Separator],
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let separators = separators
            .iter()
            .map(|sep| {
                Regex::new(sep.pattern())
                    .map(|re| (*sep, re))
                    .map_err(|e| ChunkingError::InvalidConfig(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunks in document order
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every character, plus the end of the text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = if total - start <= self.chunk_size {
                total
            } else {
                self.find_cut(text, &bounds, start)
            };

            chunks.push(Chunk {
                index: chunks.len(),
                start,
                text: text[bounds[start]..bounds[end]].to_string(),
            });

            if end == total {
                break;
            }

            // end > start + overlap, so this always moves forward
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Pick the end of the chunk that starts at character `start`
    fn find_cut(&self, text: &str, bounds: &[usize], start: usize) -> usize {
        let limit = start + self.chunk_size;
        let floor = start + self.chunk_overlap;
        let base = bounds[start];
        let window = &text[base..bounds[limit]];

        for (separator, re) in &self.separators {
            let cut = re
                .find_iter(window)
                .filter_map(|m| bounds.binary_search(&(base + m.end())).ok())
                .filter(|&end| end > floor)
                .last();

            if let Some(end) = cut {
                tracing::trace!("Cut at {} on {:?}", end, separator);
                return end;
            }
        }

        limit
    }
}
