//! CLI command implementations.

pub mod get;
pub mod list;
pub mod recover;
pub mod retry;
pub mod submit;

use std::path::Path;
use std::sync::Arc;

use assay::{
    AnthropicProvider, GeminiProvider, InsightProvider, LlmConfig, MockProvider, OpenAIProvider,
    Pipeline, PipelineConfig, Report, ReportId, ReportStatus, SqliteStore, SubmissionOutcome,
    Upload,
};
use colored::Colorize;
use tracing::debug;

use crate::cli::ProviderChoice;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn open_store(db: &Path) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    debug!(db = %db.display(), "opening report store");
    Ok(Arc::new(SqliteStore::open(db)?))
}

pub fn build_provider(
    choice: &ProviderChoice,
    model: Option<String>,
) -> Result<Arc<dyn InsightProvider>, Box<dyn std::error::Error>> {
    let provider: Arc<dyn InsightProvider> = match (choice, model) {
        (ProviderChoice::Gemini, None) => Arc::new(GeminiProvider::from_env()?),
        (ProviderChoice::Gemini, Some(m)) => Arc::new(GeminiProvider::with_config(
            api_key("GEMINI_API_KEY")?,
            LlmConfig::default().with_model(m),
        )?),
        (ProviderChoice::Anthropic, None) => Arc::new(AnthropicProvider::from_env()?),
        (ProviderChoice::Anthropic, Some(m)) => Arc::new(AnthropicProvider::with_config(
            api_key("ANTHROPIC_API_KEY")?,
            LlmConfig::default().with_model(m),
        )?),
        (ProviderChoice::OpenAI, None) => Arc::new(OpenAIProvider::from_env()?),
        (ProviderChoice::OpenAI, Some(m)) => Arc::new(OpenAIProvider::with_config(
            api_key("OPENAI_API_KEY")?,
            LlmConfig::default().with_model(m),
        )?),
        (ProviderChoice::Mock, _) => Arc::new(MockProvider::new()),
    };
    Ok(provider)
}

fn api_key(var: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(var).map_err(|_| format!("{} environment variable not set", var).into())
}

pub fn build_pipeline(
    db: &Path,
    provider: Arc<dyn InsightProvider>,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;
    Ok(Pipeline::new(config, open_store(db)?, provider)?)
}

pub fn read_upload(path: &Path) -> Result<Upload, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()).into());
    }
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Upload::new(filename, bytes))
}

pub fn parse_id(id: &str) -> Result<ReportId, Box<dyn std::error::Error>> {
    id.parse::<ReportId>()
        .map_err(|e| format!("Invalid report id '{}': {}", id, e).into())
}

pub fn status_label(status: ReportStatus) -> colored::ColoredString {
    match status {
        ReportStatus::Pending => status.as_str().white(),
        ReportStatus::Processing => status.as_str().yellow(),
        ReportStatus::Completed => status.as_str().green(),
        ReportStatus::Failed => status.as_str().red(),
    }
}

pub fn print_outcome(outcome: &SubmissionOutcome) {
    println!(
        "{} {} {}",
        "Report".cyan().bold(),
        outcome.report_id.to_string().white(),
        status_label(outcome.status)
    );
    if let Some(rows) = outcome.total_rows {
        println!("  Rows:    {}", rows);
    }
    if let Some(score) = outcome.score {
        let marker = if outcome.degraded { " (derived)" } else { "" };
        println!("  Score:   {:.1}{}", score, marker.yellow());
    }
    if let Some(ref summary) = outcome.summary {
        println!("  Summary: {}", summary);
    }
    if let Some(ref failure) = outcome.failure {
        println!("  Failure: {}", failure.to_string().red());
    }
}

pub fn print_report(report: &Report) {
    println!(
        "{} {} {}",
        "Report".cyan().bold(),
        report.id.to_string().white(),
        status_label(report.status)
    );
    println!("  File:     {}", report.filename);
    println!("  Uploaded: {}", report.uploaded_at.to_rfc3339());
    println!("  Updated:  {}", report.updated_at.to_rfc3339());
    if let Some(rows) = report.total_rows {
        println!("  Rows:     {}", rows);
    }
    if let Some(score) = report.insight_score {
        let marker = if report.degraded { " (derived)" } else { "" };
        println!("  Score:    {:.1}{}", score, marker.yellow());
    }
    if let Some(ref summary) = report.summary_text {
        println!("  Summary:  {}", summary);
    }
    if let Some(ref failure) = report.failure {
        println!("  Failure:  {}", failure.to_string().red());
    }
}
