use super::{ChatMessage, GenerationError, GenerativeModel, Role};
use crate::config::{read_api_key, LlmConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

struct Session {
    client: Client,
    api_key: String,
}

/// Gemini `generateContent` client
pub struct GeminiModel {
    session: OnceCell<Session>,
    endpoint: String,
    model: String,
    api_key_env: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            session: OnceCell::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.trim_start_matches("models/").to_string(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn session(&self) -> Result<&Session, GenerationError> {
        self.session
            .get_or_try_init(|| async {
                let api_key = read_api_key(&self.api_key_env).ok_or_else(|| {
                    GenerationError::Initialization(format!(
                        "environment variable {} is not set",
                        self.api_key_env
                    ))
                })?;

                let client = Client::builder()
                    .timeout(self.timeout)
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| GenerationError::Initialization(e.to_string()))?;

                Ok::<_, GenerationError>(Session { client, api_key })
            })
            .await
    }

    fn request_body<'a>(&self, messages: &'a [ChatMessage]) -> GenerateRequest<'a> {
        let system: Vec<Part<'a>> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part { text: &m.content })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| Content {
                role: Some("user"),
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: system,
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let session = self.session().await?;
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = session
            .client
            .post(&url)
            .header("x-goog-api-key", &session.api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.without_url().to_string()))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| GenerationError::Malformed("response has no candidates".to_string()))?;

        Ok(content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_request_body_splits_system_instruction() {
        let model = GeminiModel::new(&Config::default().llm);
        let messages = vec![
            ChatMessage::system("Only use the context."),
            ChatMessage::user("--Document Context--\n..."),
        ];

        let json = serde_json::to_value(model.request_body(&messages)).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "Only use the context."
        );
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Paris"},{"text":" is the capital."}],"role":"model"}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "Paris is the capital.");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let mut config = Config::default().llm;
        config.api_key_env = "FOLIO_TEST_UNSET_GEMINI_LLM_KEY".to_string();
        let model = GeminiModel::new(&config);

        let result = model.generate(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(GenerationError::Initialization(_))));
    }
}
