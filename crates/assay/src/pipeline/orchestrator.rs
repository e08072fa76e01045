//! The report pipeline: validate, profile, acquire insight, persist.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use moka::sync::Cache;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::error::{AiServiceError, AssayError, Result, StoreError, ValidationError};
use crate::input::{FileValidator, Row, Table, Upload};
use crate::llm::{Insight, InsightClient, InsightProvider};
use crate::profile::{Profile, Profiler};
use crate::report::{
    FailureKind, FailureReason, Metric, Report, ReportId, ReportStatus, TransitionFields,
    timestamp_now,
};
use crate::store::{Page, ReportFilter, ReportStore};

use super::outcome::SubmissionOutcome;
use super::retry::{RetryDecision, RetryPolicy};

/// Reports fetched per page while scanning for stuck ones.
const RECOVERY_PAGE: usize = 100;

/// Where the table for a run comes from.
enum TableSource {
    Upload(Upload),
    Cached(Arc<Table>),
}

/// Work done inside the processing deadline.
struct StageOutput {
    total_rows: u64,
    profile: Profile,
    insight: Insight,
}

enum StageFailure {
    Validation(ValidationError),
    Insight { error: AiServiceError, total_rows: u64 },
    Task(String),
}

/// Orchestrates report processing.
///
/// Owns the per-report state machine: `pending -> processing -> completed`
/// or `failed`, with explicit `failed -> processing` retries. Every run that
/// enters `processing` resolves to a terminal status before returning; the
/// stages share one deadline and [`recover_stuck`](Self::recover_stuck)
/// covers runs that died with their process.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use assay::{GeminiProvider, MemoryStore, Pipeline, PipelineConfig, Upload};
///
/// # async fn run() -> assay::Result<()> {
/// let pipeline = Pipeline::new(
///     PipelineConfig::from_env()?,
///     Arc::new(MemoryStore::new()),
///     Arc::new(GeminiProvider::from_env()?),
/// )?;
/// let outcome = pipeline
///     .submit(Upload::new("sales.csv", "region,units\nNorth,3\n"))
///     .await?;
/// println!("{} {:?}", outcome.status, outcome.score);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ReportStore>,
    client: InsightClient,
    validator: FileValidator,
    profiler: Profiler,
    retry_policy: RetryPolicy,
    ai_permits: Semaphore,
    tables: Cache<ReportId, Arc<Table>>,
}

impl Pipeline {
    /// Create a pipeline. Fails if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ReportStore>,
        provider: Arc<dyn InsightProvider>,
    ) -> Result<Self> {
        config.validate()?;
        if config.processing_deadline <= config.insight_budget() {
            warn!(
                deadline = ?config.processing_deadline,
                budget = ?config.insight_budget(),
                "processing deadline is shorter than the AI retry budget; timeouts may surface as missed deadlines"
            );
        }

        info!(
            store = store.name(),
            provider = provider.name(),
            ai_concurrency = config.ai_concurrency,
            "pipeline ready"
        );

        Ok(Self {
            validator: FileValidator::new(&config),
            profiler: Profiler::new(),
            retry_policy: RetryPolicy::from_config(&config),
            ai_permits: Semaphore::new(config.ai_concurrency),
            tables: Cache::new(config.table_cache_capacity),
            client: InsightClient::new(provider),
            store,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process an upload to a terminal status.
    ///
    /// Returns the existing report unchanged when the same bytes were
    /// already submitted and that report is completed or still in flight.
    /// Validation and terminal AI failures are recorded on the report and
    /// returned as errors carrying its id.
    pub async fn submit(&self, upload: Upload) -> Result<SubmissionOutcome> {
        let report = match self.create(&upload).await? {
            Created::New(report) => report,
            Created::Existing(report) => return Ok(report.into()),
        };
        self.start(report, upload).await
    }

    /// Create the report and process it on a spawned task.
    ///
    /// Returns the pending (or existing) state straight away; poll
    /// [`get_report`](Self::get_report) for the result.
    pub async fn submit_detached(self: &Arc<Self>, upload: Upload) -> Result<SubmissionOutcome> {
        let report = match self.create(&upload).await? {
            Created::New(report) => report,
            Created::Existing(report) => return Ok(report.into()),
        };

        let outcome = SubmissionOutcome::from(&report);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let id = report.id;
            if let Err(e) = pipeline.start(report, upload).await {
                warn!(report_id = %id, error = %e, "detached run failed");
            }
        });
        Ok(outcome)
    }

    pub async fn get_report(&self, id: ReportId) -> Result<Report> {
        self.storage(self.store.get(id)).await
    }

    pub async fn list_reports(&self, filter: &ReportFilter, page: Page) -> Result<Vec<Report>> {
        self.storage(self.store.list(filter, page)).await
    }

    pub async fn metrics(&self, id: ReportId) -> Result<Vec<Metric>> {
        self.storage(self.store.metrics(id)).await
    }

    /// Replay a failed report from `processing`.
    ///
    /// Uses the table cached from the earlier run when there is one,
    /// otherwise re-validates `upload`, which must hash to the report's
    /// fingerprint.
    pub async fn retry(&self, id: ReportId, upload: Option<Upload>) -> Result<SubmissionOutcome> {
        let report = self.get_report(id).await?;
        if report.status != ReportStatus::Failed {
            return Err(AssayError::NotRetryable {
                report_id: id,
                status: report.status,
            });
        }

        if let Some(ref upload) = upload {
            let actual = upload.fingerprint();
            if actual != report.fingerprint {
                return Err(AssayError::Validation {
                    report_id: id,
                    source: ValidationError::FingerprintMismatch {
                        expected: report.fingerprint,
                        actual,
                    },
                });
            }
        }

        let source = match (self.tables.get(&id), upload) {
            (Some(table), _) => TableSource::Cached(table),
            (None, Some(upload)) => TableSource::Upload(upload),
            (None, None) => return Err(AssayError::RetryPayloadRequired(id)),
        };

        info!(report_id = %id, cached = matches!(source, TableSource::Cached(_)), "retrying report");
        let transition = self.store.transition(id, ReportStatus::Processing, TransitionFields::none());
        let report = match self.storage(transition).await {
            Ok(report) => report,
            // Lost a race with a concurrent retry.
            Err(AssayError::Internal(StoreError::InvalidTransition { from, .. })) => {
                return Err(AssayError::NotRetryable {
                    report_id: id,
                    status: from,
                });
            }
            Err(e) => {
                self.abandon(id, &e).await;
                return Err(e);
            }
        };
        self.run(report, source).await
    }

    /// Fail every report that has sat in `pending` or `processing` longer
    /// than the processing deadline. Returns the ids that were resolved.
    pub async fn recover_stuck(&self) -> Result<Vec<ReportId>> {
        let mut stuck = Vec::new();
        for status in [ReportStatus::Pending, ReportStatus::Processing] {
            let filter = ReportFilter::default().with_status(status);
            let mut offset = 0;
            loop {
                let page = self
                    .list_reports(&filter, Page::new(offset, RECOVERY_PAGE))
                    .await?;
                let fetched = page.len();
                stuck.extend(page.into_iter().filter(|r| self.is_stale(r)));
                if fetched < RECOVERY_PAGE {
                    break;
                }
                offset += fetched;
            }
        }

        let mut recovered = Vec::with_capacity(stuck.len());
        for report in stuck {
            if self.fail_stale(&report).await? {
                recovered.push(report.id);
            }
        }
        Ok(recovered)
    }

    /// Run [`recover_stuck`](Self::recover_stuck) every `interval` until the
    /// pipeline is dropped or the handle is aborted.
    pub fn spawn_watchdog(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(pipeline) = weak.upgrade() else {
                    debug!("pipeline dropped, watchdog exiting");
                    break;
                };
                match pipeline.recover_stuck().await {
                    Ok(ids) if !ids.is_empty() => {
                        info!(count = ids.len(), "watchdog resolved stuck reports")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "watchdog sweep failed"),
                }
            }
        })
    }

    async fn create(&self, upload: &Upload) -> Result<Created> {
        let fingerprint = upload.fingerprint();
        let mut outcome = self
            .storage(self.store.create(&fingerprint, &upload.filename))
            .await?;

        // An earlier run died before resolving; fail it and start over.
        if !outcome.created && self.is_stale(&outcome.report) {
            self.fail_stale(&outcome.report).await?;
            outcome = self
                .storage(self.store.create(&fingerprint, &upload.filename))
                .await?;
        }

        if outcome.created {
            debug!(report_id = %outcome.report.id, %fingerprint, "report created");
            Ok(Created::New(outcome.report))
        } else {
            info!(
                report_id = %outcome.report.id,
                status = %outcome.report.status,
                "duplicate upload, returning existing report"
            );
            Ok(Created::Existing(outcome.report))
        }
    }

    /// Move a freshly created report into `processing` and run it.
    async fn start(&self, report: Report, upload: Upload) -> Result<SubmissionOutcome> {
        let id = report.id;
        let transition = self
            .store
            .transition(id, ReportStatus::Processing, TransitionFields::none());
        let report = match self.storage(transition).await {
            Ok(report) => report,
            Err(err) => {
                self.abandon(id, &err).await;
                return Err(err);
            }
        };
        self.run(report, TableSource::Upload(upload)).await
    }

    /// Run the stages for a report in `processing` and record the result.
    async fn run(&self, report: Report, source: TableSource) -> Result<SubmissionOutcome> {
        let span = info_span!("pipeline", report_id = %report.id, filename = %report.filename);
        self.resolve(report.id, source).instrument(span).await
    }

    async fn resolve(&self, id: ReportId, source: TableSource) -> Result<SubmissionOutcome> {
        let deadline = self.config.processing_deadline;
        match timeout(deadline, self.stages(id, source)).await {
            Ok(Ok(output)) => self.complete(id, output).await,
            Ok(Err(StageFailure::Validation(source))) => {
                warn!(error = %source, "upload rejected");
                let reason = FailureReason::new(FailureKind::Validation, source.to_string());
                self.fail(id, reason, None).await?;
                Err(AssayError::Validation {
                    report_id: id,
                    source,
                })
            }
            Ok(Err(StageFailure::Insight { error, total_rows })) => {
                warn!(error = %error, "insight acquisition failed");
                let reason = FailureReason::new(failure_kind(&error), error.to_string());
                self.fail(id, reason, Some(total_rows)).await?;
                Err(AssayError::Insight {
                    report_id: id,
                    source: error,
                })
            }
            Ok(Err(StageFailure::Task(message))) => {
                let reason = FailureReason::new(FailureKind::Internal, message.clone());
                self.fail(id, reason, None).await?;
                Err(AssayError::Task(message))
            }
            Err(_) => {
                warn!(?deadline, "processing deadline exceeded");
                let reason = FailureReason::new(
                    FailureKind::DeadlineExceeded,
                    format!("processing did not finish within {:?}", deadline),
                );
                self.fail(id, reason, None).await?;
                Err(AssayError::DeadlineExceeded {
                    report_id: id,
                    deadline,
                })
            }
        }
    }

    async fn stages(
        &self,
        id: ReportId,
        source: TableSource,
    ) -> std::result::Result<StageOutput, StageFailure> {
        let table = match source {
            TableSource::Cached(table) => {
                debug!(rows = table.row_count(), "using cached table");
                table
            }
            TableSource::Upload(upload) => {
                let validator = self.validator.clone();
                let table = tokio::task::spawn_blocking(move || validator.validate(&upload))
                    .await
                    .map_err(|e| StageFailure::Task(format!("validation task failed: {}", e)))?
                    .map_err(StageFailure::Validation)?;
                let table = Arc::new(table);
                self.tables.insert(id, Arc::clone(&table));
                debug!(
                    rows = table.row_count(),
                    columns = table.column_count(),
                    "upload validated"
                );
                table
            }
        };

        let profiler = self.profiler;
        let for_profile = Arc::clone(&table);
        let profile = tokio::task::spawn_blocking(move || profiler.profile(&for_profile))
            .await
            .map_err(|e| StageFailure::Task(format!("profiling task failed: {}", e)))?;
        let total_rows = profile.row_count as u64;
        debug!(total_rows, "table profiled");

        let sample = table.head(self.config.sample_rows);
        let insight = self
            .acquire_insight(&profile, sample)
            .await
            .map_err(|error| StageFailure::Insight { error, total_rows })?;

        Ok(StageOutput {
            total_rows,
            profile,
            insight,
        })
    }

    /// Call the insight client under the concurrency cap and retry policy.
    /// The permit is held for one attempt and released before backing off.
    async fn acquire_insight(
        &self,
        profile: &Profile,
        sample: &[Row],
    ) -> std::result::Result<Insight, AiServiceError> {
        let mut retries = 0;
        let mut strict = false;

        loop {
            let attempt = {
                let _permit = self.ai_permits.acquire().await.map_err(|_| {
                    AiServiceError::Unavailable {
                        status: None,
                        message: "AI concurrency limiter closed".to_string(),
                    }
                })?;
                match timeout(self.config.ai_timeout, self.client.request(profile, sample, strict))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AiServiceError::Timeout(self.config.ai_timeout)),
                }
            };

            let error = match attempt {
                Ok(insight) => return Ok(insight),
                Err(error) => error,
            };

            match self.retry_policy.decide(&error, retries, strict) {
                RetryDecision::Retry(delay) => {
                    retries += 1;
                    warn!(
                        error = %error,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "AI call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Reprompt => {
                    warn!(error = %error, "malformed AI response, re-prompting");
                    strict = true;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }

    async fn complete(&self, id: ReportId, output: StageOutput) -> Result<SubmissionOutcome> {
        let StageOutput {
            total_rows,
            profile,
            insight,
        } = output;
        let fields = TransitionFields::completed(
            total_rows,
            insight.summary_text,
            insight.insight_score,
            insight.degraded,
        );

        let report = match self
            .storage(self.store.transition(id, ReportStatus::Completed, fields))
            .await
        {
            Ok(report) => report,
            Err(err) => match self.get_report(id).await {
                // A timed-out write may still have landed.
                Ok(current) if current.status == ReportStatus::Completed => current,
                // The watchdog may have failed the report while it ran.
                Ok(current) if current.status == ReportStatus::Failed => {
                    return Err(AssayError::DeadlineExceeded {
                        report_id: id,
                        deadline: self.config.processing_deadline,
                    });
                }
                _ => {
                    warn!(error = %err, "completion rejected, aborting run");
                    self.abandon(id, &err).await;
                    return Err(err);
                }
            },
        };
        self.tables.invalidate(&id);

        let metrics = profile.numeric_metrics();
        if !metrics.is_empty() {
            if let Err(e) = self.storage(self.store.put_metrics(id, &metrics)).await {
                warn!(error = %e, "failed to store metrics");
            }
        }

        info!(
            total_rows,
            score = ?report.insight_score,
            degraded = report.degraded,
            "report completed"
        );
        Ok(report.into())
    }

    /// Record a terminal failure. A report that is already failed is left
    /// alone.
    async fn fail(&self, id: ReportId, reason: FailureReason, total_rows: Option<u64>) -> Result<()> {
        let fields = TransitionFields::failed(reason).with_total_rows(total_rows);
        match self
            .storage(self.store.transition(id, ReportStatus::Failed, fields))
            .await
        {
            Ok(_) => Ok(()),
            // Already failed elsewhere, or a timed-out write that landed.
            Err(err) => match self.get_report(id).await {
                Ok(current) if current.status == ReportStatus::Failed => {
                    debug!("report already failed");
                    Ok(())
                }
                _ => Err(err),
            },
        }
    }

    /// Record an internal failure after the run was aborted by a store
    /// error. Best effort: if this fails too the report is left for
    /// [`recover_stuck`](Self::recover_stuck).
    async fn abandon(&self, id: ReportId, err: &AssayError) {
        let reason = FailureReason::new(FailureKind::Internal, err.to_string());
        if let Err(e) = self.fail(id, reason, None).await {
            warn!(report_id = %id, error = %e, "could not record failure, leaving for recovery");
        }
    }

    /// In flight and untouched for longer than the processing deadline.
    fn is_stale(&self, report: &Report) -> bool {
        if report.status.is_terminal() {
            return false;
        }
        let deadline = chrono::TimeDelta::from_std(self.config.processing_deadline)
            .unwrap_or(chrono::TimeDelta::MAX);
        timestamp_now()
            .checked_sub_signed(deadline)
            .is_some_and(|cutoff| report.updated_at < cutoff)
    }

    /// Fail a stale report. Returns false when it resolved on its own in the
    /// meantime.
    async fn fail_stale(&self, report: &Report) -> Result<bool> {
        let message = match report.status {
            ReportStatus::Pending => format!(
                "processing never started within {:?}",
                self.config.processing_deadline
            ),
            _ => format!(
                "no progress within {:?}; processing abandoned",
                self.config.processing_deadline
            ),
        };
        let fields =
            TransitionFields::failed(FailureReason::new(FailureKind::DeadlineExceeded, message));
        match self
            .storage(self.store.transition(report.id, ReportStatus::Failed, fields))
            .await
        {
            Ok(_) => {
                warn!(report_id = %report.id, from = %report.status, "recovered stuck report");
                Ok(true)
            }
            Err(AssayError::Internal(StoreError::InvalidTransition { .. })) => {
                debug!(report_id = %report.id, "stuck report already resolved");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Bound a store call by the storage timeout.
    ///
    /// A timed-out call is abandoned, not cancelled: the SQLite store keeps
    /// running it on the blocking pool and may still commit. Transition
    /// failures are therefore resolved by re-reading the report.
    async fn storage<T>(
        &self,
        op: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        match timeout(self.config.storage_timeout, op).await {
            Ok(result) => result.map_err(AssayError::from),
            Err(_) => Err(AssayError::Internal(StoreError::transient(format!(
                "{} store did not respond within {:?}",
                self.store.name(),
                self.config.storage_timeout
            )))),
        }
    }
}

enum Created {
    New(Report),
    Existing(Report),
}

/// Failure kind recorded for a terminal AI error.
fn failure_kind(error: &AiServiceError) -> FailureKind {
    match error {
        AiServiceError::Timeout(_) => FailureKind::Timeout,
        AiServiceError::RateLimited { .. } => FailureKind::RateLimited,
        AiServiceError::Unauthorized(_) => FailureKind::Unauthorized,
        AiServiceError::MalformedResponse(_) => FailureKind::MalformedResponse,
        AiServiceError::Unavailable { .. } => FailureKind::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            failure_kind(&AiServiceError::Timeout(Duration::from_secs(1))),
            FailureKind::Timeout
        );
        assert_eq!(
            failure_kind(&AiServiceError::RateLimited { retry_after: None }),
            FailureKind::RateLimited
        );
        assert_eq!(
            failure_kind(&AiServiceError::MalformedResponse("x".to_string())),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            failure_kind(&AiServiceError::Unavailable {
                status: Some(503),
                message: String::new()
            }),
            FailureKind::Unavailable
        );
    }
}
