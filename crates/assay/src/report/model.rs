//! Report records and their lifecycle states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, immutable report identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReportId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Processing status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    /// Completed or failed; nothing moves the report on automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// Whether `self -> to` is in the allowed set. `pending -> failed` is
    /// only taken when a report never started processing.
    pub fn can_transition_to(&self, to: ReportStatus) -> bool {
        matches!(
            (self, to),
            (ReportStatus::Pending, ReportStatus::Processing)
                | (ReportStatus::Pending, ReportStatus::Failed)
                | (ReportStatus::Processing, ReportStatus::Completed)
                | (ReportStatus::Processing, ReportStatus::Failed)
                | (ReportStatus::Failed, ReportStatus::Processing)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "processing" => Ok(ReportStatus::Processing),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(format!("unknown report status '{}'", other)),
        }
    }
}

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Timeout,
    RateLimited,
    Unauthorized,
    MalformedResponse,
    Unavailable,
    DeadlineExceeded,
    /// Storage failure or broken invariant while the report was in flight.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Unavailable => "unavailable",
            FailureKind::DeadlineExceeded => "deadline_exceeded",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(FailureKind::Validation),
            "timeout" => Ok(FailureKind::Timeout),
            "rate_limited" => Ok(FailureKind::RateLimited),
            "unauthorized" => Ok(FailureKind::Unauthorized),
            "malformed_response" => Ok(FailureKind::MalformedResponse),
            "unavailable" => Ok(FailureKind::Unavailable),
            "deadline_exceeded" => Ok(FailureKind::DeadlineExceeded),
            "internal" => Ok(FailureKind::Internal),
            other => Err(format!("unknown failure kind '{}'", other)),
        }
    }
}

/// Why a report failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One record per processed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    /// Original file name, informational only.
    pub filename: String,
    /// Content hash of the raw bytes.
    pub fingerprint: String,
    pub uploaded_at: DateTime<Utc>,
    /// Row count observed by the profiler. Immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    /// In [0, 100] when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_score: Option<f64>,
    /// Set when the score had to be clamped or derived.
    #[serde(default)]
    pub degraded: bool,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// A fresh pending report.
    pub fn pending(fingerprint: impl Into<String>, filename: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            id: ReportId::new(),
            filename: filename.into(),
            fingerprint: fingerprint.into(),
            uploaded_at: now,
            total_rows: None,
            summary_text: None,
            insight_score: None,
            degraded: false,
            status: ReportStatus::Pending,
            failure: None,
            updated_at: now,
        }
    }
}

/// Current time at the precision the stores persist (microseconds).
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A named numeric value attached to a completed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use ReportStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        let allowed: Vec<(ReportStatus, ReportStatus)> = all
            .iter()
            .flat_map(|&from| all.iter().map(move |&to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (Pending, Processing),
                (Pending, Failed),
                (Processing, Completed),
                (Processing, Failed),
                (Failed, Processing),
            ]
        );
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "processing", "completed", "failed"] {
            assert_eq!(s.parse::<ReportStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn test_report_serializes_lowercase_status() {
        let report = Report::pending("sha256:00", "a.csv");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("summary_text").is_none());
    }
}
