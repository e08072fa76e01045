//! External AI service integration.
//!
//! The pipeline sends a profile summary plus a few sample rows to an
//! [`InsightProvider`] and expects a JSON object carrying a narrative
//! summary and an insight score. [`InsightClient`] builds the request and
//! normalises whatever comes back; retries and deadlines belong to the
//! pipeline.
//!
//! # Supported Providers
//!
//! - **Gemini** - Google models via API (requires `GEMINI_API_KEY`)
//! - **Anthropic** - Claude models via API (requires `ANTHROPIC_API_KEY`)
//! - **OpenAI** - GPT models via API (requires `OPENAI_API_KEY`)
//! - **Mock** - scripted replies for tests and offline runs

mod anthropic;
mod client;
mod gemini;
mod mock;
mod openai;
mod prompts;
mod provider;

pub use anthropic::AnthropicProvider;
pub use client::{DEFAULT_SCORE, Insight, InsightClient, normalize_score, parse_insight};
pub use gemini::GeminiProvider;
pub use mock::{MockProvider, MockReply};
pub use openai::OpenAIProvider;
pub use prompts::{insight_prompt, system_prompt};
pub use provider::{InsightProvider, InsightRequest, LlmConfig};
