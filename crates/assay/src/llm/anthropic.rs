//! Insights from the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AiServiceError, ConfigError};

use super::provider::{InsightProvider, InsightRequest, LlmConfig, send_json};

/// Messages endpoint.
const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Pinned `anthropic-version` header value.
const API_VERSION: &str = "2023-06-01";

/// Insight provider backed by Claude models.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl AnthropicProvider {
    /// Provider with default model settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_config(
            api_key,
            LlmConfig::default().with_model("claude-3-5-haiku-latest"),
        )
    }

    /// Provider with explicit model settings. The key is used as given.
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

    /// Reads the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("ANTHROPIC_API_KEY".to_string()))?;
        Self::new(api_key)
    }

    fn build_headers(&self) -> Result<HeaderMap, AiServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| AiServiceError::Unauthorized(format!("Invalid API key: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

#[async_trait]
impl InsightProvider for AnthropicProvider {
    async fn complete(&self, request: &InsightRequest) -> Result<String, AiServiceError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": request.system,
            "messages": [
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
        let api_response: ApiResponse = send_json(http, self.config.timeout).await?;

        // First text block wins
        api_response
            .content
            .into_iter()
            .find_map(|block| (block.content_type == "text").then_some(block.text))
            .ok_or_else(|| AiServiceError::MalformedResponse("No text in API response".to_string()))
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let provider = AnthropicProvider::new("test").unwrap();
        assert_eq!(provider.config().model, "claude-3-5-haiku-latest");
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_response_shape() {
        let raw = r#"{"content": [{"type": "tool_use"}, {"type": "text", "text": "hello"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .content
            .into_iter()
            .find_map(|b| (b.content_type == "text").then_some(b.text));
        assert_eq!(text.as_deref(), Some("hello"));
    }
}
