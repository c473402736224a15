//! Configuration management for folio
//!
//! Loading order: TOML file, then `FOLIO_SECTION__KEY` environment overrides,
//! then an optional named profile, then validation. The core consumes the
//! result as immutable parameters.

use crate::chunking::Separator;
use crate::error::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";
pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub document: DocumentConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Source document and how to turn it into text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub path: PathBuf,
    /// "text" or "command"
    pub extractor: String,
    /// argv for the "command" extractor, `{path}` is substituted
    #[serde(default)]
    pub extract_command: Vec<String>,
}

/// Chunking configuration (sizes in characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(default = "Separator::default_priority")]
    pub separators: Vec<Separator>,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" or "gemini"
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
    pub api_key_env: String,
    pub endpoint: String,
    /// Request timeout for hosted providers
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_timeout() -> u64 {
    60
}

/// Query-time retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub context_separator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini" or "openai" (any OpenAI-compatible endpoint)
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub endpoint: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Socket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_from(path, None)
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        Self::load_from(path, Some(profile))
    }

    fn load_from(path: &Path, profile: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(FolioError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FolioError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        if let Some(profile) = profile {
            config.apply_profile(profile)?;
        }

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FolioError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| FolioError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(endpoint) = overrides.llm_endpoint {
            self.llm.endpoint = endpoint;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FOLIO_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `FOLIO_`-prefixed overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("FOLIO_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "DOCUMENT__PATH" => self.document.path = PathBuf::from(value),
            "DOCUMENT__EXTRACTOR" => self.document.extractor = value.to_string(),
            "CHUNKING__CHUNK_SIZE" => self.chunking.chunk_size = parse_number(path, value)?,
            "CHUNKING__CHUNK_OVERLAP" => self.chunking.chunk_overlap = parse_number(path, value)?,
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__TIMEOUT_SECS" => {
                self.embedding.timeout_secs = parse_number(path, value)? as u64
            }
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_number(path, value)?,
            "LLM__PROVIDER" => self.llm.provider = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__ENDPOINT" => self.llm.endpoint = value.to_string(),
            "SERVER__SOCKET_PATH" => self.server.socket_path = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| FolioError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("folio").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.folio");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
            },
            document: DocumentConfig {
                path: data_dir.join("document.txt"),
                extractor: "text".to_string(),
                extract_command: vec![
                    "pdftotext".to_string(),
                    "-layout".to_string(),
                    "{path}".to_string(),
                    "-".to_string(),
                ],
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                separators: Separator::default_priority(),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                api_key_env: "GOOGLE_API_KEY".to_string(),
                endpoint: GEMINI_ENDPOINT.to_string(),
                timeout_secs: default_embedding_timeout(),
            },
            retrieval: RetrievalConfig {
                top_k: 4,
                context_separator: "\n\n".to_string(),
                max_context_chars: None,
            },
            llm: LlmConfig {
                provider: "gemini".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key_env: "GOOGLE_API_KEY".to_string(),
                endpoint: GEMINI_ENDPOINT.to_string(),
                temperature: 0.2,
                timeout_secs: 60,
            },
            server: ServerConfig {
                socket_path: data_dir.join("folio.sock"),
                max_connections: 32,
            },
            profiles: HashMap::new(),
        }
    }
}

fn parse_number(path: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| FolioError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as a number", value),
    })
}

/// Read a credential from the environment, treating an empty value as unset
pub fn read_api_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
