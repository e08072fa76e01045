//! Report persistence.
//!
//! The store is the single writer of report status. Every implementation
//! routes status changes through [`lifecycle::apply`](crate::report::lifecycle::apply)
//! and serializes operations so that concurrent transitions on one report are
//! applied in arrival order.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::report::{Metric, Report, ReportId, ReportStatus, TransitionFields};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of [`ReportStore::create`].
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub report: Report,
    /// False when an existing non-failed report was returned instead.
    pub created: bool,
}

/// Filter for [`ReportStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    /// Case-insensitive substring of the file name.
    pub filename_contains: Option<String>,
    pub fingerprint: Option<String>,
}

impl ReportFilter {
    pub fn with_status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, report: &Report) -> bool {
        if self.status.is_some_and(|s| s != report.status) {
            return false;
        }
        if let Some(ref fp) = self.fingerprint {
            if &report.fingerprint != fp {
                return false;
            }
        }
        if let Some(ref needle) = self.filename_contains {
            if !report
                .filename
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// Persistence for reports and their metrics.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create a pending report, or return the existing non-failed report
    /// with the same fingerprint.
    async fn create(&self, fingerprint: &str, filename: &str) -> Result<CreateOutcome, StoreError>;

    /// Move a report to `to`, recording `fields`.
    ///
    /// Fails with [`StoreError::InvalidTransition`] when the transition is not
    /// allowed or would violate a report invariant.
    async fn transition(
        &self,
        id: ReportId,
        to: ReportStatus,
        fields: TransitionFields,
    ) -> Result<Report, StoreError>;

    async fn get(&self, id: ReportId) -> Result<Report, StoreError>;

    /// Reports matching `filter`, newest upload first.
    async fn list(&self, filter: &ReportFilter, page: Page) -> Result<Vec<Report>, StoreError>;

    /// Replace the metrics of a completed report.
    async fn put_metrics(&self, id: ReportId, metrics: &[Metric]) -> Result<(), StoreError>;

    async fn metrics(&self, id: ReportId) -> Result<Vec<Metric>, StoreError>;

    /// Name of this store (for logging).
    fn name(&self) -> &str;
}

/// Pick the report `create` should return for a fingerprint: a completed
/// report if one exists, otherwise the newest non-failed one.
fn select_existing<'a>(candidates: impl Iterator<Item = &'a Report>) -> Option<&'a Report> {
    candidates
        .filter(|r| r.status != ReportStatus::Failed)
        .max_by(|a, b| {
            let a_done = a.status == ReportStatus::Completed;
            let b_done = b.status == ReportStatus::Completed;
            a_done
                .cmp(&b_done)
                .then(a.uploaded_at.cmp(&b.uploaded_at))
        })
}

/// Newest upload first, ties broken by id.
fn list_order(a: &Report, b: &Report) -> std::cmp::Ordering {
    b.uploaded_at
        .cmp(&a.uploaded_at)
        .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
}
