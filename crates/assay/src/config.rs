//! Pipeline configuration.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the report pipeline.
///
/// Passed to [`Pipeline::new`](crate::Pipeline::new) at construction; nothing
/// in the library reads global state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    /// Allowed file extensions, lowercase without the dot.
    pub allowed_extensions: BTreeSet<String>,
    /// Deadline for a single AI call.
    pub ai_timeout: Duration,
    /// Retries after the first attempt for transient AI failures.
    pub ai_max_retries: u32,
    /// Base delay for exponential backoff.
    pub ai_backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub ai_backoff_max: Duration,
    /// Whether to add random jitter to backoff delays.
    pub backoff_jitter: bool,
    /// Maximum simultaneous AI calls in flight.
    pub ai_concurrency: usize,
    /// Deadline for a single storage operation.
    pub storage_timeout: Duration,
    /// Deadline for validation, profiling and insight acquisition combined.
    /// Should exceed [`insight_budget`](Self::insight_budget) so a run of
    /// timed-out AI attempts resolves as a timeout, not a missed deadline.
    pub processing_deadline: Duration,
    /// Number of leading rows sent with the profile.
    pub sample_rows: usize,
    /// Parsed tables kept for retries.
    pub table_cache_capacity: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: ["csv", "tsv"].iter().map(|s| s.to_string()).collect(),
            ai_timeout: Duration::from_secs(30),
            ai_max_retries: 3,
            ai_backoff_base: Duration::from_millis(500),
            ai_backoff_max: Duration::from_secs(30),
            backoff_jitter: true,
            ai_concurrency: 4,
            storage_timeout: Duration::from_secs(5),
            processing_deadline: Duration::from_secs(180),
            sample_rows: 5,
            table_cache_capacity: 64,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `ASSAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("ASSAY_MAX_FILE_SIZE") {
            config.max_file_size = parse_value("ASSAY_MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("ASSAY_ALLOWED_EXTENSIONS") {
            config.allowed_extensions = parse_extensions(&v);
        }
        if let Some(v) = lookup("ASSAY_AI_TIMEOUT_SECS") {
            config.ai_timeout = Duration::from_secs(parse_value("ASSAY_AI_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("ASSAY_AI_MAX_RETRIES") {
            config.ai_max_retries = parse_value("ASSAY_AI_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ASSAY_AI_BACKOFF_MS") {
            config.ai_backoff_base = Duration::from_millis(parse_value("ASSAY_AI_BACKOFF_MS", &v)?);
        }
        if let Some(v) = lookup("ASSAY_AI_CONCURRENCY") {
            config.ai_concurrency = parse_value("ASSAY_AI_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("ASSAY_STORAGE_TIMEOUT_SECS") {
            config.storage_timeout =
                Duration::from_secs(parse_value("ASSAY_STORAGE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("ASSAY_PROCESSING_DEADLINE_SECS") {
            config.processing_deadline =
                Duration::from_secs(parse_value("ASSAY_PROCESSING_DEADLINE_SECS", &v)?);
        }
        if let Some(v) = lookup("ASSAY_SAMPLE_ROWS") {
            config.sample_rows = parse_value("ASSAY_SAMPLE_ROWS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid("max_file_size must be > 0".to_string()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.ai_concurrency == 0 {
            return Err(ConfigError::Invalid("ai_concurrency must be > 0".to_string()));
        }
        if self.ai_timeout.is_zero() {
            return Err(ConfigError::Invalid("ai_timeout must be > 0".to_string()));
        }
        if self.storage_timeout.is_zero() {
            return Err(ConfigError::Invalid("storage_timeout must be > 0".to_string()));
        }
        if self.processing_deadline.is_zero() {
            return Err(ConfigError::Invalid(
                "processing_deadline must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Worst-case time spent acquiring an insight when every attempt times
    /// out: each attempt's `ai_timeout` plus the unjittered backoff between
    /// them. Rate-limit hints can stretch it further.
    pub fn insight_budget(&self) -> Duration {
        let attempts = self.ai_timeout.saturating_mul(self.ai_max_retries.saturating_add(1));
        (0..self.ai_max_retries).fold(attempts, |total, retry| {
            let backoff = self
                .ai_backoff_base
                .saturating_mul(2u32.saturating_pow(retry))
                .min(self.ai_backoff_max);
            total.saturating_add(backoff)
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.ai_max_retries = max_retries;
        self.ai_backoff_base = backoff_base;
        self
    }

    pub fn with_ai_concurrency(mut self, permits: usize) -> Self {
        self.ai_concurrency = permits;
        self
    }

    pub fn with_processing_deadline(mut self, deadline: Duration) -> Self {
        self.processing_deadline = deadline;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.backoff_jitter = false;
        self
    }

    /// Comma-separated allow-set, for messages.
    pub fn allowed_extensions_display(&self) -> String {
        self.allowed_extensions
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            message: e.to_string(),
        })
}

fn parse_extensions(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(normalize_extension)
        .filter(|e| !e.is_empty())
        .collect()
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.allowed_extensions.contains("csv"));
        assert_eq!(config.sample_rows, 5);
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("ASSAY_MAX_FILE_SIZE", "2048"),
            ("ASSAY_ALLOWED_EXTENSIONS", " .CSV, txt ,"),
            ("ASSAY_AI_MAX_RETRIES", "5"),
            ("ASSAY_AI_CONCURRENCY", "2"),
        ]))
        .unwrap();

        assert_eq!(config.max_file_size, 2048);
        assert_eq!(config.ai_max_retries, 5);
        assert_eq!(config.ai_concurrency, 2);
        assert_eq!(config.allowed_extensions_display(), "csv, txt");
    }

    #[test]
    fn test_unparsable_value_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("ASSAY_AI_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ASSAY_AI_TIMEOUT_SECS"));
    }

    #[test]
    fn test_default_deadline_covers_insight_budget() {
        let config = PipelineConfig::default();
        // 4 attempts of 30s plus 0.5s + 1s + 2s of backoff.
        assert_eq!(config.insight_budget(), Duration::from_millis(123_500));
        assert!(config.processing_deadline > config.insight_budget());
    }

    #[test]
    fn test_insight_budget_caps_backoff() {
        let config = PipelineConfig::default()
            .with_ai_timeout(Duration::from_secs(1))
            .with_retries(6, Duration::from_secs(10));
        // 7s of attempts; backoff 10 + 20 + then four capped at 30.
        assert_eq!(config.insight_budget(), Duration::from_secs(7 + 10 + 20 + 4 * 30));
    }

    #[test]
    fn test_zero_ai_timeout_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("ASSAY_AI_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("ai_timeout")));
    }

    #[test]
    fn test_zero_storage_timeout_rejected() {
        let err =
            PipelineConfig::from_lookup(lookup_from(&[("ASSAY_STORAGE_TIMEOUT_SECS", "0")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("storage_timeout")));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("ASSAY_AI_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
