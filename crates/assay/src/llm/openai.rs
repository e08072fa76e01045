//! Insights from the OpenAI chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AiServiceError, ConfigError};

use super::provider::{InsightProvider, InsightRequest, LlmConfig, send_json};

/// Chat completions endpoint.
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Insight provider backed by GPT models, in JSON mode.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAIProvider {
    /// Provider with default model settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_config(api_key, LlmConfig::default().with_model("gpt-4o-mini"))
    }

    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    /// Reads the key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("OPENAI_API_KEY".to_string()))?;
        Self::new(api_key)
    }

    fn build_headers(&self) -> Result<HeaderMap, AiServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| AiServiceError::Unauthorized(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl InsightProvider for OpenAIProvider {
    async fn complete(&self, request: &InsightRequest) -> Result<String, AiServiceError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": request.system
                },
                {
                    "role": "user",
                    "content": request.prompt
                }
            ]
        });

        let http = self
            .client
            .post(API_URL)
            .headers(self.build_headers()?)
            .json(&body);
        let api_response: OpenAIResponse = send_json(http, self.config.timeout).await?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiServiceError::MalformedResponse("No response from OpenAI".to_string()))
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let provider = OpenAIProvider::new("test").unwrap();
        assert_eq!(provider.config().model, "gpt-4o-mini");
    }

    #[test]
    fn test_null_content_is_none() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
