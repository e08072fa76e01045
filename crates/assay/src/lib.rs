//! Assay: report processing pipeline for tabular business uploads.
//!
//! An upload is validated, parsed into a table, profiled, and sent as a
//! compact profile to an external AI service that returns a narrative
//! summary and an insight score. The result is persisted as a report whose
//! status moves through `pending -> processing -> completed | failed`.
//!
//! # Core Principles
//!
//! - **Idempotent**: the same bytes submitted twice map to one report
//! - **Always resolves**: a report that starts processing ends completed or failed
//! - **Bounded**: AI calls share a concurrency cap, a timeout and a retry budget
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use assay::{MemoryStore, MockProvider, Pipeline, PipelineConfig, Upload};
//!
//! # #[tokio::main]
//! # async fn main() -> assay::Result<()> {
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockProvider::new()),
//! )?;
//!
//! let outcome = pipeline
//!     .submit(Upload::new("sales.csv", "region,units\nNorth,3\nSouth,4\n"))
//!     .await?;
//! println!("{}: {:?}", outcome.status, outcome.summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod llm;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod store;

pub use config::PipelineConfig;
pub use error::{AiServiceError, AssayError, ConfigError, Result, StoreError, ValidationError};
pub use input::{FileValidator, Table, Upload, Value};
pub use llm::{
    AnthropicProvider, GeminiProvider, Insight, InsightClient, InsightProvider, LlmConfig,
    MockProvider, MockReply, OpenAIProvider,
};
pub use pipeline::{Pipeline, SubmissionOutcome};
pub use profile::{ColumnType, Profile, Profiler};
pub use report::{FailureKind, FailureReason, Metric, Report, ReportId, ReportStatus};
pub use store::{MemoryStore, Page, ReportFilter, ReportStore, SqliteStore};
