//! Answering language model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::models::{LlmConfig, LlmProvider};
use crate::utils::retry::{RetryConfig, with_retry};

/// Takes one rendered prompt and returns free text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama server's non-streaming `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryConfig::new(config.max_retries),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ServerError(format!(
                "status {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.temperature.map(|temperature| GenerateOptions { temperature }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else if e.is_connect() {
                    LlmError::ConnectionError(e.to_string())
                } else {
                    LlmError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServerError(format!("status {}: {}", status, body)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if !body.done {
            tracing::warn!(model = %self.model, "generation reported as incomplete");
        }
        Ok(body.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "generating answer");
        with_retry(&self.retry, "generate", || self.generate_once(prompt)).await
    }
}

/// Build the language model selected by configuration.
pub fn create_language_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>, LlmError> {
    match config.provider {
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(GenerateRequest {
            model: "mistral",
            prompt: "hi",
            stream: false,
            options: None,
        })
        .unwrap();
        assert_eq!(body["model"], "mistral");
        assert_eq!(body["stream"], false);
        assert!(body.get("options").is_none());

        let body = serde_json::to_value(GenerateRequest {
            model: "mistral",
            prompt: "hi",
            stream: false,
            options: Some(GenerateOptions { temperature: 0.5 }),
        })
        .unwrap();
        assert_eq!(body["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"mistral","created_at":"2024-01-01T00:00:00Z","response":"LFP.","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "LFP.");
        assert!(parsed.done);
    }

    #[test]
    fn test_client_from_config() {
        let config = LlmConfig {
            url: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model_id(), "mistral");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = LlmConfig {
            url: "http://127.0.0.1:9".to_string(),
            max_retries: 1,
            ..Default::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::ConnectionError(_) | LlmError::RequestError(_) | LlmError::Timeout
        ));
    }
}
