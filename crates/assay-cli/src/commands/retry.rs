//! Retry command - replay a failed report.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::ProviderChoice;

use super::{
    CommandResult, build_pipeline, build_provider, parse_id, print_outcome, read_upload,
};

pub async fn run(
    db: &Path,
    id: &str,
    file: Option<PathBuf>,
    provider: ProviderChoice,
    model: Option<String>,
    json_output: bool,
) -> CommandResult {
    let id = parse_id(id)?;
    let upload = file.as_deref().map(read_upload).transpose()?;
    let pipeline = build_pipeline(db, build_provider(&provider, model)?)?;

    if !json_output {
        println!("{} {}", "Retrying".cyan().bold(), id.to_string().white());
    }

    let outcome = pipeline.retry(id, upload).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}
