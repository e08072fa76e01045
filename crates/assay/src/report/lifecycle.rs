//! Transition rules shared by every store implementation.

use chrono::{DateTime, Utc};

use crate::error::StoreError;

use super::model::{FailureReason, Report, ReportStatus};

/// Fields recorded alongside a status change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionFields {
    pub total_rows: Option<u64>,
    pub summary_text: Option<String>,
    pub insight_score: Option<f64>,
    pub degraded: bool,
    pub failure: Option<FailureReason>,
}

impl TransitionFields {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn completed(total_rows: u64, summary_text: String, insight_score: f64, degraded: bool) -> Self {
        Self {
            total_rows: Some(total_rows),
            summary_text: Some(summary_text),
            insight_score: Some(insight_score),
            degraded,
            failure: None,
        }
    }

    pub fn failed(failure: FailureReason) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn with_total_rows(mut self, total_rows: Option<u64>) -> Self {
        self.total_rows = total_rows;
        self
    }
}

/// Apply a transition to a copy of `report`.
///
/// Rejects transitions outside the allowed set and any change that would
/// leave the report violating its invariants: a completed report always has
/// summary, score in [0, 100] and row count; a failed report always has a
/// reason and never a score; `total_rows` never changes once set.
pub fn apply(
    report: &Report,
    to: ReportStatus,
    fields: TransitionFields,
    now: DateTime<Utc>,
) -> Result<Report, StoreError> {
    let from = report.status;
    let reject = |reason: &str| StoreError::InvalidTransition {
        id: report.id,
        from,
        to,
        reason: reason.to_string(),
    };

    if !from.can_transition_to(to) {
        return Err(reject("transition not allowed"));
    }

    let mut next = report.clone();

    if let Some(rows) = fields.total_rows {
        match report.total_rows {
            Some(existing) if existing != rows => {
                return Err(reject("total_rows is immutable once set"));
            }
            _ => next.total_rows = Some(rows),
        }
    }

    if to != ReportStatus::Completed
        && (fields.summary_text.is_some() || fields.insight_score.is_some())
    {
        return Err(reject("summary and score are only recorded on completion"));
    }

    match to {
        ReportStatus::Completed => {
            let summary = fields
                .summary_text
                .ok_or_else(|| reject("completion requires summary_text"))?;
            let score = fields
                .insight_score
                .ok_or_else(|| reject("completion requires insight_score"))?;
            if !(0.0..=100.0).contains(&score) {
                return Err(reject("insight_score must be within [0, 100]"));
            }
            if next.total_rows.is_none() {
                return Err(reject("completion requires total_rows"));
            }
            next.summary_text = Some(summary);
            next.insight_score = Some(score);
            next.degraded = fields.degraded;
            next.failure = None;
        }
        ReportStatus::Failed => {
            let failure = fields
                .failure
                .ok_or_else(|| reject("failure requires a reason"))?;
            next.summary_text = None;
            next.insight_score = None;
            next.degraded = false;
            next.failure = Some(failure);
        }
        ReportStatus::Processing => {
            next.failure = None;
        }
        ReportStatus::Pending => return Err(reject("transition not allowed")),
    }

    next.status = to;
    next.updated_at = now.max(report.updated_at);
    Ok(next)
}
