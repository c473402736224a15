use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::GeminiEmbedder;
use crate::error::{FolioError, Result, ValidationError};
use std::collections::HashSet;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_document(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_server(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FolioError::ConfigValidation { errors })
        }
    }

    /// Report credentials that would be missing at first use
    ///
    /// Kept out of `validate` so a config can be checked on a machine that
    /// does not hold the keys.
    pub fn check_credentials(config: &Config) -> Vec<ValidationError> {
        let mut missing = Vec::new();

        if config.embedding.provider == "gemini"
            && super::read_api_key(&config.embedding.api_key_env).is_none()
        {
            missing.push(ValidationError::new(
                "embedding.api_key_env",
                format!("Environment variable {} is not set", config.embedding.api_key_env),
            ));
        }

        // Local OpenAI-compatible servers usually run without a key
        if config.llm.provider == "gemini" && super::read_api_key(&config.llm.api_key_env).is_none()
        {
            missing.push(ValidationError::new(
                "llm.api_key_env",
                format!("Environment variable {} is not set", config.llm.api_key_env),
            ));
        }

        missing
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_document(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked at load time, the path may contain ~
        if config.document.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "document.path",
                "Document path cannot be empty",
            ));
        }

        match config.document.extractor.as_str() {
            "text" => {}
            "command" => {
                if config.document.extract_command.is_empty() {
                    errors.push(ValidationError::new(
                        "document.extract_command",
                        "Command extractor requires a non-empty extract_command",
                    ));
                }
            }
            other => errors.push(ValidationError::new(
                "document.extractor",
                format!("Extractor must be 'text' or 'command', got '{}'", other),
            )),
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    chunking.chunk_overlap, chunking.chunk_size
                ),
            ));
        }

        let mut seen = HashSet::new();
        for separator in &chunking.separators {
            if !seen.insert(separator) {
                errors.push(ValidationError::new(
                    "chunking.separators",
                    format!("Separator {:?} listed more than once", separator),
                ));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        match embedding.provider.as_str() {
            "fastembed" => {}
            "gemini" => {
                if embedding.batch_size > crate::embedding::GEMINI_MAX_BATCH {
                    errors.push(ValidationError::new(
                        "embedding.batch_size",
                        format!(
                            "Gemini accepts at most {} texts per batch",
                            crate::embedding::GEMINI_MAX_BATCH
                        ),
                    ));
                }
                if embedding.timeout_secs == 0 {
                    errors.push(ValidationError::new(
                        "embedding.timeout_secs",
                        "Timeout must be greater than 0",
                    ));
                }
                if let Err(e) =
                    GeminiEmbedder::new(&embedding.model, &embedding.endpoint, &embedding.api_key_env)
                {
                    errors.push(ValidationError::new("embedding.model", e.to_string()));
                }
                Self::validate_endpoint("embedding.endpoint", &embedding.endpoint, errors);
            }
            other => errors.push(ValidationError::new(
                "embedding.provider",
                format!("Provider must be 'fastembed' or 'gemini', got '{}'", other),
            )),
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if config.retrieval.max_context_chars == Some(0) {
            errors.push(ValidationError::new(
                "retrieval.max_context_chars",
                "max_context_chars must be greater than 0 when set",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let llm = &config.llm;

        let valid_providers = ["gemini", "openai"];
        if !valid_providers.contains(&llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, llm.provider
                ),
            ));
        }

        if llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", llm.temperature),
            ));
        }

        if llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        Self::validate_endpoint("llm.endpoint", &llm.endpoint, errors);
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.socket_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "server.socket_path",
                "Socket path cannot be empty",
            ));
        }

        if config.server.max_connections == 0 {
            errors.push(ValidationError::new(
                "server.max_connections",
                "max_connections must be greater than 0",
            ));
        }
    }

    fn validate_endpoint(path: &str, endpoint: &str, errors: &mut Vec<ValidationError>) {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            errors.push(ValidationError::new(
                path,
                format!("Endpoint must start with http:// or https://, got '{}'", endpoint),
            ));
        }
    }
}
