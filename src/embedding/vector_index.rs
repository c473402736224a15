/// Exact cosine-similarity index over the document's chunks
use crate::chunking::Chunk;
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A chunk paired with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in [-1, 1], higher is more similar
    pub score: f32,
}

/// Read-only nearest-neighbour lookup
///
/// Callers depend on this trait rather than on [`VectorIndex`] so that an
/// approximate index can stand in for the exact one.
pub trait SimilarityIndex: Send + Sync {
    /// Up to `k` entries ranked by descending similarity, ties in insertion order
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorIndexError>;

    /// Number of indexed entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, `None` while the index holds no entries
    fn dimension(&self) -> Option<usize>;
}

/// Brute-force index
///
/// Vectors are L2-normalised once at build time and stored as the rows of a
/// matrix; a query is normalised and scored against every row with one
/// matrix-vector product, so the score is cosine similarity. Zero vectors
/// score 0 against everything. Entries are never modified after `build`.
#[derive(Debug)]
pub struct VectorIndex {
    matrix: Array2<f32>,
    chunks: Vec<Chunk>,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// Build an index from (vector, chunk) pairs
    ///
    /// Every vector must have the length of the first one.
    pub fn build(entries: Vec<(Vec<f32>, Chunk)>) -> Result<Self, VectorIndexError> {
        let Some(dimension) = entries.first().map(|(vector, _)| vector.len()) else {
            return Ok(Self {
                matrix: Array2::zeros((0, 0)),
                chunks: Vec::new(),
                dimension: None,
            });
        };

        if dimension == 0 {
            return Err(VectorIndexError::InvalidArgument(
                "vectors must have at least one dimension".to_string(),
            ));
        }

        let rows = entries.len();
        let mut data = Vec::with_capacity(rows * dimension);
        let mut chunks = Vec::with_capacity(rows);

        for (vector, chunk) in entries {
            if vector.len() != dimension {
                return Err(VectorIndexError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend(normalized(&vector));
            chunks.push(chunk);
        }

        let matrix = Array2::from_shape_vec((rows, dimension), data)
            .map_err(|e| VectorIndexError::InvalidArgument(e.to_string()))?;

        Ok(Self {
            matrix,
            chunks,
            dimension: Some(dimension),
        })
    }

    /// Indexed chunks in insertion order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

impl SimilarityIndex for VectorIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorIndexError> {
        if k == 0 {
            return Err(VectorIndexError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }

        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };

        if query.len() != dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: query.len(),
            });
        }

        let query = Array1::from(normalized(query));
        let scores = self.matrix.dot(&query);

        // Stable sort keeps insertion order among equal scores
        let mut order: Vec<usize> = (0..self.chunks.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order.truncate(k);

        Ok(order
            .into_iter()
            .map(|i| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score: scores[i],
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            start: index * 10,
            text: text.to_string(),
        }
    }

    fn axis(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(vec![
            (axis(4, 0), chunk(0, "alpha")),
            (axis(4, 1), chunk(1, "beta")),
            (vec![0.9, 0.1, 0.0, 0.0], chunk(2, "mostly alpha")),
            (axis(4, 3), chunk(3, "delta")),
        ])
        .unwrap()
    }

    #[test]
    fn test_index_creation() {
        let index = sample_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimension(), Some(4));
        assert!(!index.is_empty());
    }

    #[test]
    fn test_self_match_ranks_first() {
        let index = sample_index();
        for (i, name) in ["alpha", "beta", "delta"].iter().enumerate() {
            let hot = [0, 1, 3][i];
            let results = index.search(&axis(4, hot), 1).unwrap();
            assert_eq!(results[0].chunk.text, *name);
            assert!((results[0].score - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_results_sorted_descending() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.2, 0.0, 0.1], 4).unwrap();

        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].chunk.text, "mostly alpha");
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = sample_index();
        let results = index.search(&axis(4, 0), 50).unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = VectorIndex::build(vec![
            (vec![1.0, 0.0], chunk(0, "first")),
            (vec![0.0, 1.0], chunk(1, "other")),
            (vec![2.0, 0.0], chunk(2, "second")),
            (vec![5.0, 0.0], chunk(3, "third")),
        ])
        .unwrap();

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_zero_k_rejected() {
        let index = sample_index();
        assert!(matches!(
            index.search(&axis(4, 0), 0),
            Err(VectorIndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_query_dimension_validation() {
        let index = sample_index();
        assert!(matches!(
            index.search(&[1.0, 0.0], 2),
            Err(VectorIndexError::InvalidDimension {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_build_dimension_mismatch() {
        let result = VectorIndex::build(vec![
            (vec![1.0, 0.0, 0.0], chunk(0, "a")),
            (vec![1.0, 0.0], chunk(1, "b")),
        ]);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert!(index.search(&[1.0, 2.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let index = VectorIndex::build(vec![
            (vec![0.0, 0.0], chunk(0, "blank")),
            (vec![0.0, 1.0], chunk(1, "up")),
        ])
        .unwrap();

        let results = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(results[0].chunk.text, "up");
        assert_eq!(results[1].score, 0.0);
    }
}
