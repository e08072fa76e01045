//! Caller-facing result of a submission.

use serde::{Deserialize, Serialize};

use crate::report::{FailureReason, Report, ReportId, ReportStatus};

/// What a caller gets back from `submit` and `retry`.
///
/// A non-terminal status means the report is being processed elsewhere;
/// poll [`Pipeline::get_report`](crate::Pipeline::get_report) until it
/// settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub report_id: ReportId,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl SubmissionOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<&Report> for SubmissionOutcome {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id,
            status: report.status,
            summary: report.summary_text.clone(),
            score: report.insight_score,
            degraded: report.degraded,
            total_rows: report.total_rows,
            failure: report.failure.clone(),
        }
    }
}

impl From<Report> for SubmissionOutcome {
    fn from(report: Report) -> Self {
        Self::from(&report)
    }
}
