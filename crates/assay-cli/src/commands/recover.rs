//! Recover command - resolve reports abandoned in processing.

use std::path::Path;
use std::sync::Arc;

use assay::MockProvider;
use colored::Colorize;

use super::{CommandResult, build_pipeline};

pub async fn run(db: &Path, json_output: bool) -> CommandResult {
    // Recovery only touches the store; the provider is never called.
    let pipeline = build_pipeline(db, Arc::new(MockProvider::new()))?;
    let recovered = pipeline.recover_stuck().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&recovered)?);
        return Ok(());
    }

    if recovered.is_empty() {
        println!("{}", "No stuck reports".green());
    } else {
        println!(
            "{} {} stuck report(s)",
            "Failed".yellow().bold(),
            recovered.len()
        );
        for id in &recovered {
            println!("  {}", id);
        }
    }
    Ok(())
}
