//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Assay: validate, profile and summarise tabular reports
#[derive(Parser)]
#[command(name = "assay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Report database (SQLite)
    #[arg(long, global = true, default_value = "assay.db")]
    pub db: PathBuf,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a file and wait for its report
    Submit {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// AI provider used for insights
        #[arg(long, default_value = "gemini")]
        provider: ProviderChoice,

        /// Model to use (provider-specific, e.g., "gemini-1.5-pro", "gpt-4o")
        #[arg(long)]
        model: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a single report
    Get {
        /// Report id
        #[arg(value_name = "REPORT_ID")]
        id: String,

        /// Include stored metrics
        #[arg(long)]
        metrics: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List reports, newest first
    List {
        /// Only reports with this status (pending, processing, completed, failed)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Only reports whose file name contains this text
        #[arg(long, short = 'f')]
        filename: Option<String>,

        /// Number of reports to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum number of reports to show
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retry a failed report
    Retry {
        /// Report id
        #[arg(value_name = "REPORT_ID")]
        id: String,

        /// Original file, needed when the parsed table is no longer cached
        #[arg(long)]
        file: Option<PathBuf>,

        /// AI provider used for insights
        #[arg(long, default_value = "gemini")]
        provider: ProviderChoice,

        /// Model to use (provider-specific)
        #[arg(long)]
        model: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fail reports stuck in processing past the deadline
    Recover {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// AI provider choice
#[derive(Clone, Debug, Default)]
pub enum ProviderChoice {
    /// Google Gemini API (requires GEMINI_API_KEY)
    #[default]
    Gemini,
    /// Anthropic Claude API (requires ANTHROPIC_API_KEY)
    Anthropic,
    /// OpenAI GPT API (requires OPENAI_API_KEY)
    OpenAI,
    /// Canned responses, no network
    Mock,
}

impl std::str::FromStr for ProviderChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderChoice::Gemini),
            "anthropic" | "claude" => Ok(ProviderChoice::Anthropic),
            "openai" | "gpt" => Ok(ProviderChoice::OpenAI),
            "mock" | "test" => Ok(ProviderChoice::Mock),
            _ => Err(format!(
                "Unknown provider: {}. Use: gemini, anthropic, openai, or mock.",
                s
            )),
        }
    }
}

impl std::fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderChoice::Gemini => write!(f, "gemini"),
            ProviderChoice::Anthropic => write!(f, "anthropic"),
            ProviderChoice::OpenAI => write!(f, "openai"),
            ProviderChoice::Mock => write!(f, "mock"),
        }
    }
}
