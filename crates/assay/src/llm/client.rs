//! Insight acquisition: prompt construction, provider call and response
//! normalisation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AiServiceError;
use crate::input::Row;
use crate::profile::Profile;

use super::prompts;
use super::provider::{InsightProvider, InsightRequest};

/// Score used when the service returns none.
pub const DEFAULT_SCORE: f64 = 50.0;

/// Normalised service output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub summary_text: String,
    /// Always within [0, 100].
    pub insight_score: f64,
    /// The raw score was missing or out of range and has been derived.
    pub degraded: bool,
}

/// Shape accepted from the service. Field aliases cover the names models
/// tend to pick on their own.
#[derive(Debug, Deserialize)]
struct InsightPayload {
    #[serde(default, alias = "summary_text", alias = "narrative", alias = "insights")]
    summary: Option<Value>,
    #[serde(default, alias = "insight_score", alias = "overall_score")]
    score: Option<Value>,
}

/// Builds requests for a provider and normalises its answers.
#[derive(Clone)]
pub struct InsightClient {
    provider: Arc<dyn InsightProvider>,
}

impl InsightClient {
    pub fn new(provider: Arc<dyn InsightProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the request for a profile and sample.
    pub fn build_request(&self, profile: &Profile, sample: &[Row], strict: bool) -> InsightRequest {
        InsightRequest {
            system: prompts::system_prompt().to_string(),
            prompt: prompts::insight_prompt(profile, sample, strict),
            strict,
        }
    }

    /// One attempt: call the provider and parse its answer. Retries are the
    /// caller's concern.
    pub async fn request(
        &self,
        profile: &Profile,
        sample: &[Row],
        strict: bool,
    ) -> Result<Insight, AiServiceError> {
        let request = self.build_request(profile, sample, strict);
        let text = self.provider.complete(&request).await?;
        debug!(provider = self.provider.name(), bytes = text.len(), "insight response received");
        parse_insight(&text)
    }
}

/// Parse a response, trying the whole text, then a fenced code block, then
/// the outermost braces.
pub fn parse_insight(response: &str) -> Result<Insight, AiServiceError> {
    let mut last_error = String::from("empty response");

    for candidate in candidates(response) {
        match serde_json::from_str::<InsightPayload>(candidate) {
            Ok(payload) => match normalize(payload) {
                Ok(insight) => return Ok(insight),
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(AiServiceError::MalformedResponse(last_error))
}

fn candidates(response: &str) -> Vec<&str> {
    let trimmed = response.trim();
    let mut out = vec![trimmed];

    let fenced = if trimmed.contains("```json") {
        trimmed
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
    } else if trimmed.contains("```") {
        trimmed.split("```").nth(1)
    } else {
        None
    };
    if let Some(block) = fenced {
        out.push(block.trim());
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            out.push(&trimmed[start..=end]);
        }
    }

    out
}

fn normalize(payload: InsightPayload) -> Result<Insight, String> {
    let summary = match payload.summary {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => return Err("response has no summary".to_string()),
    };

    let raw = payload.score.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    });
    let (insight_score, degraded) = normalize_score(raw);
    if degraded {
        warn!(raw_score = ?raw, score = insight_score, "insight score missing or out of range");
    }

    Ok(Insight {
        summary_text: summary,
        insight_score,
        degraded,
    })
}

/// Clamp a raw score into [0, 100], deriving the default when it is absent
/// or not a finite number. The flag reports whether anything changed.
pub fn normalize_score(raw: Option<f64>) -> (f64, bool) {
    match raw {
        Some(s) if s.is_finite() && (0.0..=100.0).contains(&s) => (s, false),
        Some(s) if s.is_finite() => (s.clamp(0.0, 100.0), true),
        _ => (DEFAULT_SCORE, true),
    }
}
