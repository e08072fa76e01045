//! Google Gemini API provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AiServiceError, ConfigError};

use super::provider::{InsightProvider, InsightRequest, LlmConfig, send_json};

/// Gemini API base URL.
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini provider.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_config(api_key, LlmConfig::default())
    }

    /// Create a new Gemini provider with custom configuration.
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

    /// Create from environment variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("GEMINI_API_KEY".to_string()))?;
        Self::new(api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.config.model)
    }

    fn build_headers(&self) -> Result<HeaderMap, AiServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| AiServiceError::Unauthorized(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl InsightProvider for GeminiProvider {
    async fn complete(&self, request: &InsightRequest) -> Result<String, AiServiceError> {
        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": request.system }]
            },
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": request.prompt }]
                }
            ],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_tokens,
                "responseMimeType": "application/json"
            }
        });

        let http = self
            .client
            .post(self.endpoint())
            .headers(self.build_headers()?)
            .json(&body);
        let api_response: GeminiResponse = send_json(http, self.config.timeout).await?;

        api_response.into_text()
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Gemini API response structure.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String, AiServiceError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiServiceError::MalformedResponse(
                "No text in Gemini response".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_candidate_text() {
        let raw = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "{\"summary\": "}, {"text": "\"ok\"}"}]}}
            ]
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text().unwrap(), r#"{"summary": "ok"}"#);
    }

    #[test]
    fn test_blocked_response_is_malformed() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates": [{}]}"#).unwrap();
        assert!(matches!(
            parsed.into_text(),
            Err(AiServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_endpoint_uses_model() {
        let provider =
            GeminiProvider::with_config("k", LlmConfig::default().with_model("gemini-1.5-pro"))
                .unwrap();
        assert!(provider.endpoint().ends_with("/gemini-1.5-pro:generateContent"));
        assert_eq!(provider.name(), "gemini");
    }
}
