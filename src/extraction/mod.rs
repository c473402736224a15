//! Document loading: turn a file on disk into plain text
//!
//! Text extraction itself is delegated. Plain text files are read directly,
//! anything else goes through an external command (for example `pdftotext`)
//! whose standard output is taken as the document text.

use crate::config::DocumentConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Placeholder replaced by the document path in extraction commands
pub const PATH_PLACEHOLDER: &str = "{path}";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Extraction command failed: {0}")]
    Command(String),

    #[error("Unsupported extractor: {0}")]
    Unsupported(String),
}

/// Raw text of the single source document
#[derive(Debug, Clone)]
pub struct Document {
    /// File stem plus a short content fingerprint
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Build a document whose id is derived from the file name and content
    pub fn from_path(path: &Path, text: String) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let digest = blake3::hash(text.as_bytes()).to_hex();
        Self {
            id: format!("{}-{}", stem, &digest.as_str()[..12]),
            text,
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Produces plain text from a document on disk
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Document, ExtractionError>;

    fn name(&self) -> &str;
}

/// Reads UTF-8 text files, replacing invalid sequences
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<Document, ExtractionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractionError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{:?} is not valid UTF-8, decoding lossily", path);
                String::from_utf8_lossy(e.as_bytes()).to_string()
            }
        };

        Ok(Document::from_path(path, text))
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Runs an external program and uses its stdout as the document text
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    /// `argv[0]` is the program; `{path}` in any argument is replaced by the
    /// document path
    pub fn new(argv: &[String]) -> Result<Self, ExtractionError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExtractionError::Command("empty extraction command".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn resolved_args(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

#[async_trait]
impl TextExtractor for CommandExtractor {
    async fn extract(&self, path: &Path) -> Result<Document, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }

        let args = self.resolved_args(path);
        tracing::debug!("Running extractor: {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ExtractionError::Command(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(Document::from_path(path, text))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Build the extractor named in the configuration
pub fn create_extractor(config: &DocumentConfig) -> Result<Box<dyn TextExtractor>, ExtractionError> {
    match config.extractor.as_str() {
        "text" => Ok(Box::new(PlainTextExtractor)),
        "command" => Ok(Box::new(CommandExtractor::new(&config.extract_command)?)),
        other => Err(ExtractionError::Unsupported(other.to_string())),
    }
}
