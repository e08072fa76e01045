//! List command - show reports, newest first.

use std::path::Path;

use assay::{Page, ReportFilter, ReportStatus, ReportStore};
use colored::Colorize;

use super::{CommandResult, open_store, status_label};

pub async fn run(
    db: &Path,
    status: Option<String>,
    filename: Option<String>,
    offset: usize,
    limit: usize,
    json_output: bool,
) -> CommandResult {
    let status = status.map(|s| s.parse::<ReportStatus>()).transpose()?;
    let filter = ReportFilter {
        status,
        filename_contains: filename,
        fingerprint: None,
    };

    let store = open_store(db)?;
    let reports = store.list(&filter, Page::new(offset, limit)).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("{}", "No reports found".yellow());
        return Ok(());
    }

    for report in &reports {
        let score = report
            .insight_score
            .map(|s| format!("{:5.1}", s))
            .unwrap_or_else(|| "    -".to_string());
        println!(
            "{}  {:10}  {}  {}  {}",
            report.id.to_string().white(),
            status_label(report.status),
            score,
            report.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
            report.filename
        );
    }
    Ok(())
}
