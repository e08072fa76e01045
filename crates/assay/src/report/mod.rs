//! Report data model and lifecycle rules.

pub mod lifecycle;
mod model;

pub use lifecycle::TransitionFields;
pub use model::{FailureKind, FailureReason, Metric, Report, ReportId, ReportStatus, timestamp_now};
