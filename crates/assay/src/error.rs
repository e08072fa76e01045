//! Error types for the Assay library.

use std::time::Duration;

use thiserror::Error;

use crate::report::{ReportId, ReportStatus};

/// An upload was rejected before profiling.
///
/// Validation errors are never retried; they are recorded on the report and
/// returned to the caller immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload exceeds the configured size limit.
    #[error("file is {size} bytes, exceeding the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// File extension is not in the allow-set.
    #[error("extension '{extension}' is not allowed (allowed: {allowed})")]
    DisallowedExtension { extension: String, allowed: String },

    /// File name carries no extension at all.
    #[error("file '{0}' has no extension")]
    MissingExtension(String),

    /// Nothing to parse, not even a header row.
    #[error("file is empty")]
    EmptyFile,

    /// Two columns share a header name.
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// Content could not be parsed as tabular data.
    #[error("malformed data at row {row}: {message}")]
    Malformed { row: u64, message: String },

    /// Retry payload does not hash to the report's fingerprint.
    #[error("payload fingerprint {actual} does not match report fingerprint {expected}")]
    FingerprintMismatch { expected: String, actual: String },
}

/// Failure talking to the external AI service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AiServiceError {
    /// No response within the configured deadline.
    #[error("AI service did not respond within {0:?}")]
    Timeout(Duration),

    /// Service signalled throttling.
    #[error("AI service rate limited the request")]
    RateLimited {
        /// Backoff hint from the service, if it sent one.
        retry_after: Option<Duration>,
    },

    /// Credential rejected.
    #[error("AI service rejected the credential: {0}")]
    Unauthorized(String),

    /// Response could not be parsed into the insight schema.
    #[error("AI service returned a malformed response: {0}")]
    MalformedResponse(String),

    /// Transport failure or server-side error.
    #[error("AI service unavailable ({status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },
}

impl AiServiceError {
    /// Whether the orchestrator may retry after backing off. Client-side
    /// HTTP errors other than throttling are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AiServiceError::Timeout(_) | AiServiceError::RateLimited { .. } => true,
            AiServiceError::Unavailable { status, .. } => status.is_none_or(|s| s >= 500),
            AiServiceError::Unauthorized(_) | AiServiceError::MalformedResponse(_) => false,
        }
    }
}

/// Report store failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No report with this id.
    #[error("report not found: {0}")]
    NotFound(ReportId),

    /// Requested transition is outside the allowed set or would break a
    /// report invariant.
    #[error("invalid transition for report {id}: {from} -> {to} ({reason})")]
    InvalidTransition {
        id: ReportId,
        from: ReportStatus,
        to: ReportStatus,
        reason: String,
    },

    /// Metrics may only be written for completed reports.
    #[error("report {id} is {status}, metrics require a completed report")]
    NotCompleted { id: ReportId, status: ReportStatus },

    /// Persistence layer failure.
    #[error("storage error: {message}")]
    Storage { message: String, transient: bool },
}

impl StoreError {
    /// A persistence failure that a bounded retry may clear.
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Storage {
            message: message.into(),
            transient: true,
        }
    }

    /// A persistence failure that will not clear on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        StoreError::Storage {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Storage { transient: true, .. })
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("{0} environment variable not set")]
    MissingEnv(String),

    #[error("{0}")]
    Invalid(String),
}

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum AssayError {
    /// Upload rejected; the report has been marked failed.
    #[error("report {report_id} failed validation: {source}")]
    Validation {
        report_id: ReportId,
        #[source]
        source: ValidationError,
    },

    /// AI service failed terminally; the report has been marked failed.
    #[error("report {report_id} failed insight generation: {source}")]
    Insight {
        report_id: ReportId,
        #[source]
        source: AiServiceError,
    },

    /// Processing did not resolve before the deadline; the report has been
    /// marked failed.
    #[error("report {report_id} exceeded the processing deadline of {deadline:?}")]
    DeadlineExceeded {
        report_id: ReportId,
        deadline: Duration,
    },

    /// Retry requested for a report that is not failed.
    #[error("report {report_id} is {status} and cannot be retried")]
    NotRetryable {
        report_id: ReportId,
        status: ReportStatus,
    },

    /// Retry needs the original bytes because no parsed table is cached.
    #[error("report {0} has no cached table; the original upload is required to retry")]
    RetryPayloadRequired(ReportId),

    #[error("report not found: {0}")]
    NotFound(ReportId),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store invariant violation or persistent storage failure. Aborts the
    /// current run.
    #[error("internal error: {0}")]
    Internal(StoreError),

    #[error("internal error: {0}")]
    Task(String),
}

impl From<StoreError> for AssayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AssayError::NotFound(id),
            other => AssayError::Internal(other),
        }
    }
}

impl AssayError {
    /// The report this error was recorded against, if any.
    pub fn report_id(&self) -> Option<ReportId> {
        match self {
            AssayError::Validation { report_id, .. }
            | AssayError::Insight { report_id, .. }
            | AssayError::DeadlineExceeded { report_id, .. }
            | AssayError::NotRetryable { report_id, .. } => Some(*report_id),
            AssayError::RetryPayloadRequired(id) | AssayError::NotFound(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this error indicates a defect rather than bad input or an
    /// external failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, AssayError::Internal(_) | AssayError::Task(_))
    }
}

/// Result type alias for Assay operations.
pub type Result<T> = std::result::Result<T, AssayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_ai_errors() {
        assert!(AiServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(AiServiceError::RateLimited { retry_after: None }.is_transient());
        assert!(!AiServiceError::Unauthorized("bad key".to_string()).is_transient());
        assert!(!AiServiceError::MalformedResponse("x".to_string()).is_transient());
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let id = ReportId::new();
        let err: AssayError = StoreError::NotFound(id).into();
        assert!(matches!(err, AssayError::NotFound(found) if found == id));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_invalid_transition_is_internal() {
        let id = ReportId::new();
        let err: AssayError = StoreError::InvalidTransition {
            id,
            from: ReportStatus::Completed,
            to: ReportStatus::Processing,
            reason: "not allowed".to_string(),
        }
        .into();
        assert!(err.is_internal());
    }
}
