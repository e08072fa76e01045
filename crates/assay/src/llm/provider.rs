//! Insight provider trait and types.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::error::AiServiceError;

/// Configuration for LLM providers.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model to use (e.g., "gemini-1.5-flash").
    pub model: String,

    /// Maximum tokens in response.
    pub max_tokens: usize,

    /// Temperature for generation (0.0-1.0).
    pub temperature: f64,

    /// HTTP client timeout. The pipeline applies its own, usually shorter,
    /// deadline on top of this.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// A fully built request for the external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    /// System instruction.
    pub system: String,
    /// User prompt carrying the profile and sample rows.
    pub prompt: String,
    /// Set on the re-prompt that follows a malformed response.
    pub strict: bool,
}

/// Trait for external AI services that turn a prompt into text.
///
/// Implementations must be thread-safe (Send + Sync) so one provider can
/// serve every in-flight report.
#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// Send the request and return the raw response text.
    async fn complete(&self, request: &InsightRequest) -> Result<String, AiServiceError>;

    /// Get the configuration for this provider.
    fn config(&self) -> &LlmConfig;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

/// Map a non-success HTTP status to the matching service error. `timeout`
/// is the client deadline, reported for gateway and request timeouts.
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: String,
    timeout: Duration,
) -> AiServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiServiceError::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => AiServiceError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            AiServiceError::Timeout(timeout)
        }
        _ => AiServiceError::Unavailable {
            status: Some(status.as_u16()),
            message: body,
        },
    }
}

/// Map a transport error.
pub(crate) fn classify_transport(err: reqwest::Error, timeout: Duration) -> AiServiceError {
    if err.is_timeout() {
        AiServiceError::Timeout(timeout)
    } else {
        AiServiceError::Unavailable {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Send a prepared request and return the JSON body, mapping failures to
/// service errors.
pub(crate) async fn send_json<T: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, AiServiceError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &headers, body, timeout));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AiServiceError::MalformedResponse(format!("unexpected API response: {}", e)))
}
