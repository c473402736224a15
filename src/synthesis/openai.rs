use super::{ChatMessage, GenerationError, GenerativeModel};
use crate::config::{read_api_key, LlmConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

struct Session {
    client: Client,
    api_key: Option<String>,
}

/// Client for OpenAI-compatible `chat/completions` endpoints
///
/// Covers OpenAI itself, Groq and a local Ollama server. The API key is
/// optional since local servers usually do not check one.
pub struct OpenAiCompatibleModel {
    session: OnceCell<Session>,
    endpoint: String,
    model: String,
    api_key_env: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompatibleModel {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            session: OnceCell::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn session(&self) -> Result<&Session, GenerationError> {
        self.session
            .get_or_try_init(|| async {
                let client = Client::builder()
                    .timeout(self.timeout)
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| GenerationError::Initialization(e.to_string()))?;

                let api_key = read_api_key(&self.api_key_env);
                if api_key.is_none() {
                    tracing::debug!(
                        "{} not set, calling {} without credentials",
                        self.api_key_env,
                        self.endpoint
                    );
                }

                Ok::<_, GenerationError>(Session { client, api_key })
            })
            .await
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatibleModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let session = self.session().await?;
        let url = format!("{}/chat/completions", self.endpoint);

        let mut request = session.client.post(&url).json(&CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        });
        if let Some(key) = &session.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.without_url().to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("question")];
        let body = CompletionRequest {
            model: "llama-3.1-8b-instant",
            messages: &messages,
            temperature: 0.0,
            stream: false,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "question");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Paris"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Paris"));
    }
}
