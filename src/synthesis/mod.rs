//! Answer synthesis: one generative-model call per question
//!
//! The prompt is fixed: a system message that confines the model to the
//! retrieved context, and a user message carrying the context and the
//! question. There is no streaming and no retry.

mod gemini;
mod openai;

pub use gemini::GeminiModel;
pub use openai::OpenAiCompatibleModel;

use crate::config::LlmConfig;
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
about a document. Answer using only the document context provided by the user. If the context \
does not contain the answer, reply \"I don't know\".";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Client initialization failed: {0}")]
    Initialization(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Model service returned status {status}")]
    Status { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Model returned an empty answer")]
    EmptyAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-style text generation backend
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run one completion over the messages and return the answer text
    async fn generate(&self, messages: &[ChatMessage]) -> std::result::Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Turns a question and its retrieved context into an answer
pub struct AnswerSynthesizer {
    model: Arc<dyn GenerativeModel>,
    system_prompt: String,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// The two messages sent to the model
    pub fn build_messages(&self, query: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(format!(
                "--Document Context--\n{}\n\n--Question--\n{}\n\n--Answer--",
                context, query
            )),
        ]
    }

    /// Ask the model once; any failure becomes `GenerationUnavailable`
    pub async fn answer(&self, query: &str, context: &str) -> Result<String> {
        let messages = self.build_messages(query, context);

        let answer = self.model.generate(&messages).await.map_err(|e| {
            tracing::warn!("Generation with {} failed: {}", self.model.model_name(), e);
            FolioError::from(e)
        })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(GenerationError::EmptyAnswer.into());
        }

        Ok(answer.to_string())
    }
}

/// Build the generative model named in the configuration
pub fn create_model(config: &LlmConfig) -> std::result::Result<Arc<dyn GenerativeModel>, GenerationError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(config))),
        "openai" => Ok(Arc::new(OpenAiCompatibleModel::new(config))),
        other => Err(GenerationError::Initialization(format!(
            "Unsupported LLM provider: {}",
            other
        ))),
    }
}
