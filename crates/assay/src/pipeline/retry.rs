//! Retry policy for AI service calls.

use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::AiServiceError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then send the same request again.
    Retry(Duration),
    /// Send again immediately with the strict prompt.
    Reprompt,
    /// Terminal failure.
    GiveUp,
}

/// Bounded exponential backoff.
///
/// Transient failures (timeouts, throttling, server errors) are retried up
/// to `max_retries` times. A malformed response earns a single strict
/// re-prompt. Rejected credentials are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.ai_max_retries,
            base: config.ai_backoff_base,
            max: config.ai_backoff_max,
            jitter: config.backoff_jitter,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    /// With jitter the delay is drawn from the upper half of that window.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        let delay = self.base.saturating_mul(factor).min(self.max);
        if self.jitter {
            delay.mul_f64(0.5 + fastrand::f64() * 0.5)
        } else {
            delay
        }
    }

    /// Decide after `error`, given the transient retries already spent and
    /// whether the strict re-prompt has been used.
    pub fn decide(&self, error: &AiServiceError, retries_used: u32, reprompted: bool) -> RetryDecision {
        match error {
            AiServiceError::MalformedResponse(_) if !reprompted => RetryDecision::Reprompt,
            AiServiceError::MalformedResponse(_) | AiServiceError::Unauthorized(_) => {
                RetryDecision::GiveUp
            }
            _ if !error.is_transient() || retries_used >= self.max_retries => RetryDecision::GiveUp,
            AiServiceError::RateLimited {
                retry_after: Some(hint),
            } => RetryDecision::Retry((*hint).max(self.backoff(retries_used))),
            _ => RetryDecision::Retry(self.backoff(retries_used)),
        }
    }
}
