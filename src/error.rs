use std::path::PathBuf;
use thiserror::Error;

/// Main error type for folio
///
/// The first six variants are the failure taxonomy of the question-answering
/// pipeline; the rest cover configuration and I/O plumbing.
#[derive(Error, Debug)]
pub enum FolioError {
    /// Bad caller input: missing query, zero `k`, invalid chunk settings
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The source document could not be read or converted to text
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    /// The embedding model or service failed or returned malformed output
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vectors of different dimensionality were mixed
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No index has been built, or the built index holds no entries
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// The generative model failed to produce an answer
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Socket server errors
    #[error("Server error: {0}")]
    Server(String),
}

/// Coarse category of a [`FolioError`], used for user messaging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    ExtractionFailure,
    EmbeddingUnavailable,
    DimensionMismatch,
    IndexNotReady,
    GenerationUnavailable,
    Internal,
}

impl FolioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FolioError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FolioError::ExtractionFailure(_) => ErrorKind::ExtractionFailure,
            FolioError::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            FolioError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            FolioError::IndexNotReady(_) => ErrorKind::IndexNotReady,
            FolioError::GenerationUnavailable(_) => ErrorKind::GenerationUnavailable,
            _ => ErrorKind::Internal,
        }
    }

    /// Text safe to show to the person who asked the question
    ///
    /// Only `InvalidArgument` carries its detail through, since those messages
    /// are written by folio itself about the request. Everything else is
    /// reduced to its category.
    pub fn user_message(&self) -> String {
        match self {
            FolioError::InvalidArgument(detail) => format!("Invalid request: {}", detail),
            FolioError::ExtractionFailure(_) => "The document could not be read.".to_string(),
            FolioError::EmbeddingUnavailable(_) => {
                "The embedding service is currently unavailable. Please try again later."
                    .to_string()
            }
            FolioError::DimensionMismatch { .. } => {
                "The search index is misconfigured. Please contact the operator.".to_string()
            }
            FolioError::IndexNotReady(_) => {
                "Document data not loaded. Try again later.".to_string()
            }
            FolioError::GenerationUnavailable(_) => {
                "The answer service is currently unavailable. Please try again later.".to_string()
            }
            _ => "An internal error occurred while processing the request.".to_string(),
        }
    }
}

impl From<crate::chunking::ChunkingError> for FolioError {
    fn from(e: crate::chunking::ChunkingError) -> Self {
        FolioError::InvalidArgument(e.to_string())
    }
}

impl From<crate::extraction::ExtractionError> for FolioError {
    fn from(e: crate::extraction::ExtractionError) -> Self {
        FolioError::ExtractionFailure(e.to_string())
    }
}

impl From<crate::embedding::EmbeddingError> for FolioError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        use crate::embedding::EmbeddingError;
        match e {
            EmbeddingError::InvalidInput(msg) => FolioError::InvalidArgument(msg),
            // A backend returning vectors of the wrong size is malformed output
            other => FolioError::EmbeddingUnavailable(other.to_string()),
        }
    }
}

impl From<crate::embedding::VectorIndexError> for FolioError {
    fn from(e: crate::embedding::VectorIndexError) -> Self {
        use crate::embedding::VectorIndexError;
        match e {
            VectorIndexError::InvalidDimension { expected, actual } => {
                FolioError::DimensionMismatch { expected, actual }
            }
            VectorIndexError::InvalidArgument(msg) => FolioError::InvalidArgument(msg),
        }
    }
}

impl From<crate::synthesis::GenerationError> for FolioError {
    fn from(e: crate::synthesis::GenerationError) -> Self {
        FolioError::GenerationUnavailable(e.to_string())
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for folio operations
pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = FolioError::EmbeddingUnavailable(
            "connection refused: https://internal.example/v1?key=secret".to_string(),
        );
        let message = err.user_message();
        assert!(!message.contains("secret"));
        assert!(message.contains("unavailable"));
        assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);
    }

    #[test]
    fn test_invalid_argument_keeps_detail() {
        let err = FolioError::InvalidArgument("missing 'query' field".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.user_message().contains("missing 'query' field"));
    }

    #[test]
    fn test_component_errors_map_to_kinds() {
        use crate::embedding::{EmbeddingError, VectorIndexError};

        let err: FolioError = EmbeddingError::InvalidInput("Empty text".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: FolioError = EmbeddingError::DimensionMismatch {
            expected: 768,
            actual: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);

        let err: FolioError = VectorIndexError::InvalidDimension {
            expected: 384,
            actual: 768,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

        let err: FolioError = crate::chunking::ChunkingError::InvalidConfig("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: FolioError = crate::synthesis::GenerationError::EmptyAnswer.into();
        assert_eq!(err.kind(), ErrorKind::GenerationUnavailable);
    }

    #[test]
    fn test_plumbing_errors_are_internal() {
        let err = FolioError::Server("socket closed".to_string());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.user_message().contains("socket"));
    }
}
