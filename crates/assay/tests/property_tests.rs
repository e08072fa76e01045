//! Property-based tests for profiling, insight parsing and report rules.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p assay --test property_tests
//!
//! # More cases
//! PROPTEST_CASES=10000 cargo test -p assay --test property_tests
//! ```

use proptest::prelude::*;

use assay::llm::{normalize_score, parse_insight};
use assay::report::{TransitionFields, lifecycle};
use assay::{FileValidator, PipelineConfig, Profiler, Report, ReportStatus, Upload};

// =============================================================================
// Test Strategies
// =============================================================================

/// A single CSV cell without delimiters or quotes.
fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i32>().prop_map(|i| i.to_string()),
        (-1.0e6f64..1.0e6).prop_map(|f| format!("{:.3}", f)),
        "[a-zA-Z]{1,10}",
        Just(String::new()),
        Just("NA".to_string()),
        Just("true".to_string()),
    ]
}

/// CSV text with 2-5 columns and up to 40 rows, plus its row count.
fn csv_table() -> impl Strategy<Value = (String, usize)> {
    (2usize..=5).prop_flat_map(|cols| {
        prop::collection::vec(prop::collection::vec(cell(), cols), 0..40).prop_map(move |rows| {
            let header: Vec<String> = (0..cols).map(|i| format!("col_{}", i)).collect();
            let mut text = header.join(",");
            text.push('\n');
            for row in &rows {
                text.push_str(&row.join(","));
                text.push('\n');
            }
            (text, rows.len())
        })
    })
}

fn parse(text: &str) -> assay::Table {
    FileValidator::new(&PipelineConfig::default())
        .validate(&Upload::new("generated.csv", text))
        .expect("generated CSV should validate")
}

// =============================================================================
// Profiler Properties
// =============================================================================

proptest! {
    #[test]
    fn profile_row_count_matches_table((text, rows) in csv_table()) {
        let table = parse(&text);
        prop_assert_eq!(table.row_count(), rows);

        let profile = Profiler::new().profile(&table);
        prop_assert_eq!(profile.row_count, rows);
        prop_assert_eq!(profile.column_count, table.column_count());
    }

    #[test]
    fn profiling_is_deterministic((text, _rows) in csv_table()) {
        let table = parse(&text);
        let profiler = Profiler::new();

        let first = profiler.profile(&table);
        let second = profiler.profile(&parse(&text));
        prop_assert_eq!(first.summary_text(), second.summary_text());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn null_ratios_are_fractions((text, _rows) in csv_table()) {
        let profile = Profiler::new().profile(&parse(&text));
        for column in &profile.columns {
            prop_assert!((0.0..=1.0).contains(&column.null_ratio));
            prop_assert!(column.null_count <= profile.row_count);
            if let Some(ref n) = column.numeric {
                prop_assert!(n.min <= n.max);
                let tol = 1e-9 * n.min.abs().max(n.max.abs()).max(1.0);
                prop_assert!(n.mean >= n.min - tol && n.mean <= n.max + tol);
            }
        }
    }
}

// =============================================================================
// Score Properties
// =============================================================================

proptest! {
    #[test]
    fn normalized_score_is_always_in_range(raw in prop::option::of(any::<f64>())) {
        let (score, degraded) = normalize_score(raw);
        prop_assert!((0.0..=100.0).contains(&score));
        if let Some(r) = raw {
            if r.is_finite() && (0.0..=100.0).contains(&r) {
                prop_assert_eq!(score, r);
                prop_assert!(!degraded);
            }
        } else {
            prop_assert!(degraded);
        }
    }

    #[test]
    fn parsed_insight_score_is_in_range(score in -1.0e9f64..1.0e9, summary in "[a-zA-Z ]{1,40}") {
        prop_assume!(!summary.trim().is_empty());
        let response = format!(r#"{{"summary": "{}", "insight_score": {}}}"#, summary, score);
        let insight = parse_insight(&response).unwrap();
        prop_assert!((0.0..=100.0).contains(&insight.insight_score));
        prop_assert!(!insight.summary_text.is_empty());
    }

    #[test]
    fn parse_insight_never_panics(text in ".{0,200}") {
        if let Ok(insight) = parse_insight(&text) {
            prop_assert!((0.0..=100.0).contains(&insight.insight_score));
        }
    }
}

// =============================================================================
// Report Invariants
// =============================================================================

proptest! {
    #[test]
    fn completion_accepts_only_bounded_scores(score in any::<f64>(), rows in 0u64..10_000) {
        let pending = Report::pending("sha256:00", "a.csv");
        let processing = lifecycle::apply(
            &pending,
            ReportStatus::Processing,
            TransitionFields::none(),
            pending.uploaded_at,
        )
        .unwrap();

        let result = lifecycle::apply(
            &processing,
            ReportStatus::Completed,
            TransitionFields::completed(rows, "summary".to_string(), score, false),
            processing.updated_at,
        );

        if (0.0..=100.0).contains(&score) {
            let completed = result.unwrap();
            prop_assert!(completed.summary_text.is_some());
            prop_assert_eq!(completed.insight_score, Some(score));
            prop_assert_eq!(completed.total_rows, Some(rows));
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn fingerprint_is_content_derived(a in prop::collection::vec(any::<u8>(), 0..256), b in prop::collection::vec(any::<u8>(), 0..256)) {
        let fa = Upload::new("x.csv", a.clone()).fingerprint();
        prop_assert_eq!(&fa, &Upload::new("renamed.tsv", a.clone()).fingerprint());
        prop_assert!(fa.starts_with("sha256:"));
        if a != b {
            prop_assert_ne!(fa, Upload::new("x.csv", b).fingerprint());
        }
    }
}
