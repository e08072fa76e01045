//! Report store contract tests, run against every implementation.

use std::sync::Arc;
use std::time::Duration;

use assay::report::TransitionFields;
use assay::{
    FailureKind, FailureReason, MemoryStore, Metric, Page, ReportFilter, ReportId, ReportStatus,
    ReportStore, SqliteStore, StoreError,
};
use tempfile::TempDir;

/// Every store under test. The temp dir keeps the SQLite file alive.
fn stores() -> Vec<(Arc<dyn ReportStore>, Option<TempDir>)> {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sqlite = SqliteStore::open(dir.path().join("reports.db")).expect("Failed to open store");
    vec![
        (Arc::new(MemoryStore::new()), None),
        (Arc::new(sqlite), Some(dir)),
    ]
}

async fn complete(store: &dyn ReportStore, id: ReportId, score: f64) {
    store
        .transition(id, ReportStatus::Processing, TransitionFields::none())
        .await
        .unwrap();
    store
        .transition(
            id,
            ReportStatus::Completed,
            TransitionFields::completed(3, "Three rows.".to_string(), score, false),
        )
        .await
        .unwrap();
}

fn is_invalid_transition(err: &StoreError) -> bool {
    matches!(err, StoreError::InvalidTransition { .. })
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_happy_path_lifecycle() {
    for (store, _dir) in stores() {
        let created = store.create("sha256:01", "a.csv").await.unwrap();
        assert!(created.created);
        assert_eq!(created.report.status, ReportStatus::Pending);

        let id = created.report.id;
        complete(store.as_ref(), id, 72.5).await;

        let report = store.get(id).await.unwrap();
        assert_eq!(report.status, ReportStatus::Completed, "{}", store.name());
        assert_eq!(report.total_rows, Some(3));
        assert_eq!(report.insight_score, Some(72.5));
        assert_eq!(report.summary_text.as_deref(), Some("Three rows."));
        assert!(report.updated_at >= report.uploaded_at);
    }
}

#[tokio::test]
async fn test_transitions_outside_allowed_set_are_rejected() {
    for (store, _dir) in stores() {
        let id = store.create("sha256:02", "a.csv").await.unwrap().report.id;

        let err = store
            .transition(
                id,
                ReportStatus::Completed,
                TransitionFields::completed(1, "x".to_string(), 50.0, false),
            )
            .await
            .unwrap_err();
        assert!(is_invalid_transition(&err), "{}: {:?}", store.name(), err);

        complete(store.as_ref(), id, 50.0).await;
        let err = store
            .transition(id, ReportStatus::Processing, TransitionFields::none())
            .await
            .unwrap_err();
        assert!(is_invalid_transition(&err));

        // Rejected transitions leave the report untouched.
        assert_eq!(store.get(id).await.unwrap().status, ReportStatus::Completed);
    }
}

#[tokio::test]
async fn test_completed_invariants_are_enforced() {
    for (store, _dir) in stores() {
        let id = store.create("sha256:03", "a.csv").await.unwrap().report.id;
        store
            .transition(id, ReportStatus::Processing, TransitionFields::none())
            .await
            .unwrap();

        let missing_summary = TransitionFields {
            total_rows: Some(3),
            insight_score: Some(50.0),
            ..TransitionFields::none()
        };
        let err = store
            .transition(id, ReportStatus::Completed, missing_summary)
            .await
            .unwrap_err();
        assert!(is_invalid_transition(&err));

        let out_of_range = TransitionFields::completed(3, "x".to_string(), 101.0, false);
        let err = store
            .transition(id, ReportStatus::Completed, out_of_range)
            .await
            .unwrap_err();
        assert!(is_invalid_transition(&err));

        assert_eq!(store.get(id).await.unwrap().status, ReportStatus::Processing);
    }
}

#[tokio::test]
async fn test_failure_and_retry_clear_fields() {
    for (store, _dir) in stores() {
        let id = store.create("sha256:04", "a.csv").await.unwrap().report.id;
        store
            .transition(id, ReportStatus::Processing, TransitionFields::none())
            .await
            .unwrap();

        let reason = FailureReason::new(FailureKind::Timeout, "no answer");
        let failed = store
            .transition(
                id,
                ReportStatus::Failed,
                TransitionFields::failed(reason.clone()).with_total_rows(Some(3)),
            )
            .await
            .unwrap();
        assert_eq!(failed.failure, Some(reason));
        assert_eq!(failed.total_rows, Some(3));

        let retried = store
            .transition(id, ReportStatus::Processing, TransitionFields::none())
            .await
            .unwrap();
        assert!(retried.failure.is_none());
        assert_eq!(retried.total_rows, Some(3));

        // Row count cannot change once observed.
        let err = store
            .transition(
                id,
                ReportStatus::Completed,
                TransitionFields::completed(4, "x".to_string(), 10.0, false),
            )
            .await
            .unwrap_err();
        assert!(is_invalid_transition(&err));
    }
}

#[tokio::test]
async fn test_unknown_report() {
    for (store, _dir) in stores() {
        let id = ReportId::new();
        assert_eq!(store.get(id).await.unwrap_err(), StoreError::NotFound(id));
        assert_eq!(
            store
                .transition(id, ReportStatus::Processing, TransitionFields::none())
                .await
                .unwrap_err(),
            StoreError::NotFound(id)
        );
        assert_eq!(store.metrics(id).await.unwrap_err(), StoreError::NotFound(id));
    }
}

#[tokio::test]
async fn test_concurrent_transitions_are_serialized() {
    for (store, _dir) in stores() {
        let id = store.create("sha256:05", "a.csv").await.unwrap().report.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .transition(id, ReportStatus::Processing, TransitionFields::none())
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(is_invalid_transition(&err)),
            }
        }
        assert_eq!(succeeded, 1, "{}", store.name());
    }
}

// =============================================================================
// Idempotent Create
// =============================================================================

#[tokio::test]
async fn test_create_returns_existing_non_failed_report() {
    for (store, _dir) in stores() {
        let first = store.create("sha256:06", "a.csv").await.unwrap();
        let second = store.create("sha256:06", "b.csv").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.report, first.report);

        complete(store.as_ref(), first.report.id, 80.0).await;
        let third = store.create("sha256:06", "c.csv").await.unwrap();
        assert!(!third.created);
        assert_eq!(third.report.status, ReportStatus::Completed);
    }
}

#[tokio::test]
async fn test_create_after_failure_makes_new_report() {
    for (store, _dir) in stores() {
        let first = store.create("sha256:07", "a.csv").await.unwrap().report.id;
        store
            .transition(first, ReportStatus::Processing, TransitionFields::none())
            .await
            .unwrap();
        store
            .transition(
                first,
                ReportStatus::Failed,
                TransitionFields::failed(FailureReason::new(FailureKind::Validation, "empty")),
            )
            .await
            .unwrap();

        let second = store.create("sha256:07", "a.csv").await.unwrap();
        assert!(second.created);
        assert_ne!(second.report.id, first);

        // The failed report stays queryable.
        assert_eq!(store.get(first).await.unwrap().status, ReportStatus::Failed);
    }
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_orders_filters_and_pages() {
    for (store, _dir) in stores() {
        let mut ids = Vec::new();
        for (fp, name) in [("sha256:a", "Q1-sales.csv"), ("sha256:b", "q2-SALES.csv"), ("sha256:c", "costs.tsv")] {
            ids.push(store.create(fp, name).await.unwrap().report.id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        complete(store.as_ref(), ids[1], 60.0).await;

        let all = store.list(&ReportFilter::default(), Page::default()).await.unwrap();
        let listed: Vec<_> = all.iter().map(|r| r.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1], ids[0]], "{}", store.name());

        let completed = store
            .list(&ReportFilter::default().with_status(ReportStatus::Completed), Page::default())
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, ids[1]);

        let sales = ReportFilter {
            filename_contains: Some("Sales".to_string()),
            ..ReportFilter::default()
        };
        assert_eq!(store.list(&sales, Page::default()).await.unwrap().len(), 2);

        let by_fingerprint = ReportFilter {
            fingerprint: Some("sha256:c".to_string()),
            ..ReportFilter::default()
        };
        let found = store.list(&by_fingerprint, Page::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ids[2]);

        let page = store
            .list(&ReportFilter::default(), Page::new(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);

        let past_end = store
            .list(&ReportFilter::default(), Page::new(10, 5))
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_require_completed_report() {
    for (store, _dir) in stores() {
        let id = store.create("sha256:08", "a.csv").await.unwrap().report.id;
        let metrics = vec![Metric::new("units.mean", 4.0), Metric::new("units.sum", 12.0)];

        let err = store.put_metrics(id, &metrics).await.unwrap_err();
        assert!(
            matches!(err, StoreError::NotCompleted { status: ReportStatus::Pending, .. }),
            "{}: {:?}",
            store.name(),
            err
        );
        assert!(store.metrics(id).await.unwrap().is_empty());

        complete(store.as_ref(), id, 70.0).await;
        store.put_metrics(id, &metrics).await.unwrap();
        assert_eq!(store.metrics(id).await.unwrap(), metrics);

        // Writing again replaces the set.
        let replacement = vec![Metric::new("units.max", 5.0)];
        store.put_metrics(id, &replacement).await.unwrap();
        assert_eq!(store.metrics(id).await.unwrap(), replacement);
    }
}

// =============================================================================
// SQLite Persistence
// =============================================================================

#[tokio::test]
async fn test_sqlite_reports_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.db");

    let (id, before) = {
        let store = SqliteStore::open(&path).unwrap();
        let id = store.create("sha256:09", "a.csv").await.unwrap().report.id;
        complete(&store, id, 33.3).await;
        store
            .put_metrics(id, &[Metric::new("units.mean", 4.0)])
            .await
            .unwrap();
        (id, store.get(id).await.unwrap())
    };

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.get(id).await.unwrap(), before);
    assert_eq!(reopened.metrics(id).await.unwrap().len(), 1);
    assert!(!reopened.create("sha256:09", "a.csv").await.unwrap().created);
}
