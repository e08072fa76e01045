//! Submit command - process a file into a report.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::ProviderChoice;

use super::{CommandResult, build_pipeline, build_provider, print_outcome, read_upload};

pub async fn run(
    db: &Path,
    file: PathBuf,
    provider: ProviderChoice,
    model: Option<String>,
    json_output: bool,
) -> CommandResult {
    let upload = read_upload(&file)?;
    let pipeline = build_pipeline(db, build_provider(&provider, model)?)?;

    if !json_output {
        println!(
            "{} {} ({} bytes, provider {})",
            "Submitting".cyan().bold(),
            file.display().to_string().white(),
            upload.size(),
            provider
        );
    }

    let outcome = pipeline.submit(upload).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
        if !outcome.is_terminal() {
            println!(
                "Already in progress; run {} to check on it",
                format!("assay get {}", outcome.report_id).cyan()
            );
        }
    }
    Ok(())
}
