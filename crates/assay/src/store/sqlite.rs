//! SQLite-backed report store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::report::{
    FailureReason, Metric, Report, ReportId, ReportStatus, TransitionFields, lifecycle,
    timestamp_now,
};

use super::{CreateOutcome, Page, ReportFilter, ReportStore, select_existing};

/// Attempts per operation when SQLite reports the database busy or locked.
const RETRY_ATTEMPTS: u32 = 3;

/// Base delay between those attempts.
const RETRY_DELAY: Duration = Duration::from_millis(50);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reports (
    id              TEXT PRIMARY KEY,
    filename        TEXT NOT NULL,
    fingerprint     TEXT NOT NULL,
    uploaded_at     TEXT NOT NULL,
    total_rows      INTEGER,
    summary_text    TEXT,
    insight_score   REAL,
    degraded        INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL,
    failure_kind    TEXT,
    failure_message TEXT,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reports_fingerprint ON reports(fingerprint);
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);

CREATE TABLE IF NOT EXISTS metrics (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id    TEXT NOT NULL REFERENCES reports(id),
    metric_name  TEXT NOT NULL,
    metric_value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metrics_report ON metrics(report_id);
";

const SELECT_COLUMNS: &str = "id, filename, fingerprint, uploaded_at, total_rows, summary_text,
     insight_score, degraded, status, failure_kind, failure_message, updated_at";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let transient = matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        StoreError::Storage {
            message: err.to_string(),
            transient,
        }
    }
}

/// A raw report row from the database.
#[derive(Debug)]
struct ReportRow {
    id: String,
    filename: String,
    fingerprint: String,
    uploaded_at: String,
    total_rows: Option<i64>,
    summary_text: Option<String>,
    insight_score: Option<f64>,
    degraded: bool,
    status: String,
    failure_kind: Option<String>,
    failure_message: Option<String>,
    updated_at: String,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            fingerprint: row.get("fingerprint")?,
            uploaded_at: row.get("uploaded_at")?,
            total_rows: row.get("total_rows")?,
            summary_text: row.get("summary_text")?,
            insight_score: row.get("insight_score")?,
            degraded: row.get("degraded")?,
            status: row.get("status")?,
            failure_kind: row.get("failure_kind")?,
            failure_message: row.get("failure_message")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_report(self) -> Result<Report, StoreError> {
        let corrupt = |field: &str, detail: String| {
            StoreError::permanent(format!("corrupt {} for report {}: {}", field, self.id, detail))
        };

        let id = self
            .id
            .parse::<ReportId>()
            .map_err(|e| corrupt("id", e.to_string()))?;
        let status = self
            .status
            .parse::<ReportStatus>()
            .map_err(|e| corrupt("status", e))?;
        let total_rows = self
            .total_rows
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt("total_rows", e.to_string()))?;
        let failure = match self.failure_kind {
            Some(ref kind) => Some(FailureReason::new(
                kind.parse().map_err(|e| corrupt("failure_kind", e))?,
                self.failure_message.clone().unwrap_or_default(),
            )),
            None => None,
        };

        Ok(Report {
            id,
            filename: self.filename.clone(),
            fingerprint: self.fingerprint.clone(),
            uploaded_at: parse_timestamp(&self.uploaded_at).map_err(|e| corrupt("uploaded_at", e))?,
            total_rows,
            summary_text: self.summary_text.clone(),
            insight_score: self.insight_score,
            degraded: self.degraded,
            status,
            failure,
            updated_at: parse_timestamp(&self.updated_at).map_err(|e| corrupt("updated_at", e))?,
        })
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn load_report(conn: &Connection, id: ReportId) -> Result<Report, StoreError> {
    let sql = format!("SELECT {} FROM reports WHERE id = ?1", SELECT_COLUMNS);
    conn.query_row(&sql, params![id.to_string()], ReportRow::from_row)
        .optional()?
        .ok_or(StoreError::NotFound(id))?
        .into_report()
}

fn insert_report(conn: &Connection, report: &Report) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO reports (id, filename, fingerprint, uploaded_at, total_rows, summary_text,
         insight_score, degraded, status, failure_kind, failure_message, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            report.id.to_string(),
            report.filename,
            report.fingerprint,
            format_timestamp(report.uploaded_at),
            report.total_rows.map(|n| n as i64),
            report.summary_text,
            report.insight_score,
            report.degraded,
            report.status.as_str(),
            report.failure.as_ref().map(|f| f.kind.as_str()),
            report.failure.as_ref().map(|f| f.message.as_str()),
            format_timestamp(report.updated_at),
        ],
    )?;
    Ok(())
}

/// Overwrites every mutable column. `id`, `filename`, `fingerprint` and
/// `uploaded_at` never change.
fn update_report(conn: &Connection, report: &Report) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE reports SET total_rows=?2, summary_text=?3, insight_score=?4, degraded=?5,
         status=?6, failure_kind=?7, failure_message=?8, updated_at=?9
         WHERE id=?1",
        params![
            report.id.to_string(),
            report.total_rows.map(|n| n as i64),
            report.summary_text,
            report.insight_score,
            report.degraded,
            report.status.as_str(),
            report.failure.as_ref().map(|f| f.kind.as_str()),
            report.failure.as_ref().map(|f| f.message.as_str()),
            format_timestamp(report.updated_at),
        ],
    )?;
    Ok(())
}

/// Report store persisted in a SQLite database.
///
/// One connection behind a fair async mutex; each operation runs on the
/// blocking pool inside its own transaction.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StoreError::permanent(format!("failed to open '{}': {}", path.display(), e))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` on the blocking pool, retrying transient failures a bounded
    /// number of times.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = Arc::clone(&self.conn).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let mut attempt = 1;
            loop {
                match op(&mut *conn) {
                    Err(e) if e.is_transient() && attempt < RETRY_ATTEMPTS => {
                        warn!(attempt, error = %e, "transient storage error, retrying");
                        std::thread::sleep(RETRY_DELAY * attempt);
                        attempt += 1;
                    }
                    other => return other,
                }
            }
        })
        .await
        .map_err(|e| StoreError::permanent(format!("storage task failed: {}", e)))?
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn create(&self, fingerprint: &str, filename: &str) -> Result<CreateOutcome, StoreError> {
        let fingerprint = fingerprint.to_string();
        let filename = filename.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let sql = format!("SELECT {} FROM reports WHERE fingerprint = ?1", SELECT_COLUMNS);
            let candidates = {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(params![fingerprint], ReportRow::from_row)?;
                let reports = rows
                    .map(|r| r.map_err(StoreError::from).and_then(ReportRow::into_report))
                    .collect::<Result<Vec<_>, _>>()?;
                reports
            };

            if let Some(existing) = select_existing(candidates.iter()) {
                return Ok(CreateOutcome {
                    report: existing.clone(),
                    created: false,
                });
            }

            let report = Report::pending(fingerprint.as_str(), filename.as_str());
            insert_report(&tx, &report)?;
            tx.commit()?;
            debug!(report_id = %report.id, "report created");
            Ok(CreateOutcome {
                report,
                created: true,
            })
        })
        .await
    }

    async fn transition(
        &self,
        id: ReportId,
        to: ReportStatus,
        fields: TransitionFields,
    ) -> Result<Report, StoreError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let current = load_report(&tx, id)?;
            let next = lifecycle::apply(&current, to, fields.clone(), timestamp_now())?;
            update_report(&tx, &next)?;
            tx.commit()?;
            Ok(next)
        })
        .await
    }

    async fn get(&self, id: ReportId) -> Result<Report, StoreError> {
        self.run(move |conn| load_report(conn, id)).await
    }

    async fn list(&self, filter: &ReportFilter, page: Page) -> Result<Vec<Report>, StoreError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM reports
                 WHERE (?1 IS NULL OR status = ?1)
                   AND (?2 IS NULL OR fingerprint = ?2)
                   AND (?3 IS NULL OR instr(lower(filename), lower(?3)) > 0)
                 ORDER BY uploaded_at DESC, id ASC
                 LIMIT ?4 OFFSET ?5",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    filter.status.map(|s| s.as_str()),
                    filter.fingerprint,
                    filter.filename_contains,
                    page.limit as i64,
                    page.offset as i64,
                ],
                ReportRow::from_row,
            )?;
            let reports = rows
                .map(|r| r.map_err(StoreError::from).and_then(ReportRow::into_report))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(reports)
        })
        .await
    }

    async fn put_metrics(&self, id: ReportId, metrics: &[Metric]) -> Result<(), StoreError> {
        let metrics = metrics.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let report = load_report(&tx, id)?;
            if report.status != ReportStatus::Completed {
                return Err(StoreError::NotCompleted {
                    id,
                    status: report.status,
                });
            }
            tx.execute(
                "DELETE FROM metrics WHERE report_id = ?1",
                params![id.to_string()],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO metrics (report_id, metric_name, metric_value) VALUES (?1, ?2, ?3)",
                )?;
                for metric in &metrics {
                    stmt.execute(params![id.to_string(), metric.name, metric.value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn metrics(&self, id: ReportId) -> Result<Vec<Metric>, StoreError> {
        self.run(move |conn| {
            load_report(conn, id)?;
            let mut stmt = conn.prepare(
                "SELECT metric_name, metric_value FROM metrics WHERE report_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id.to_string()], |row| {
                Ok(Metric::new(row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            let metrics = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(metrics)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
