//! Get command - show one report.

use std::path::Path;

use assay::ReportStore;
use colored::Colorize;

use super::{CommandResult, open_store, parse_id, print_report};

pub async fn run(db: &Path, id: &str, with_metrics: bool, json_output: bool) -> CommandResult {
    let id = parse_id(id)?;
    let store = open_store(db)?;

    let report = store.get(id).await?;
    let metrics = if with_metrics {
        store.metrics(id).await?
    } else {
        Vec::new()
    };

    if json_output {
        let mut value = serde_json::to_value(&report)?;
        if with_metrics {
            value["metrics"] = serde_json::to_value(&metrics)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_report(&report);
    if with_metrics {
        println!();
        println!("{}", "Metrics:".yellow().bold());
        if metrics.is_empty() {
            println!("  (none)");
        }
        for metric in &metrics {
            println!("  {:30} {:.4}", metric.name, metric.value);
        }
    }
    Ok(())
}
