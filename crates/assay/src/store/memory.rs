//! In-process report store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::report::{
    Metric, Report, ReportId, ReportStatus, TransitionFields, lifecycle, timestamp_now,
};

use super::{CreateOutcome, Page, ReportFilter, ReportStore, list_order, select_existing};

#[derive(Debug, Default)]
struct Inner {
    reports: HashMap<ReportId, Report>,
    metrics: HashMap<ReportId, Vec<Metric>>,
}

/// Report store held in memory.
///
/// A single fair mutex guards all state, so operations are applied in the
/// order they arrive.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.reports.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create(&self, fingerprint: &str, filename: &str) -> Result<CreateOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        let existing = select_existing(
            inner
                .reports
                .values()
                .filter(|r| r.fingerprint == fingerprint),
        );
        if let Some(report) = existing {
            return Ok(CreateOutcome {
                report: report.clone(),
                created: false,
            });
        }

        let report = Report::pending(fingerprint, filename);
        inner.reports.insert(report.id, report.clone());
        Ok(CreateOutcome {
            report,
            created: true,
        })
    }

    async fn transition(
        &self,
        id: ReportId,
        to: ReportStatus,
        fields: TransitionFields,
    ) -> Result<Report, StoreError> {
        let mut inner = self.inner.lock().await;
        let current = inner.reports.get(&id).ok_or(StoreError::NotFound(id))?;
        let next = lifecycle::apply(current, to, fields, timestamp_now())?;
        inner.reports.insert(id, next.clone());
        Ok(next)
    }

    async fn get(&self, id: ReportId) -> Result<Report, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .reports
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, filter: &ReportFilter, page: Page) -> Result<Vec<Report>, StoreError> {
        let inner = self.inner.lock().await;
        let mut reports: Vec<Report> = inner
            .reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        reports.sort_by(list_order);
        Ok(reports
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn put_metrics(&self, id: ReportId, metrics: &[Metric]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let report = inner.reports.get(&id).ok_or(StoreError::NotFound(id))?;
        if report.status != ReportStatus::Completed {
            return Err(StoreError::NotCompleted {
                id,
                status: report.status,
            });
        }
        inner.metrics.insert(id, metrics.to_vec());
        Ok(())
    }

    async fn metrics(&self, id: ReportId) -> Result<Vec<Metric>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.reports.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(inner.metrics.get(&id).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
