//! Deterministic statistical profiling of parsed tables.

mod profiler;
mod types;

pub use profiler::Profiler;
pub use types::{ColumnProfile, ColumnType, NumericSummary, Profile};
