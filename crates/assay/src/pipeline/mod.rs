//! Pipeline orchestration.
//!
//! [`Pipeline`] sequences validation, profiling and insight acquisition for
//! each upload and drives the report through its status lifecycle. AI calls
//! are bounded by a shared semaphore and retried per [`RetryPolicy`].

mod orchestrator;
mod outcome;
mod retry;

pub use orchestrator::Pipeline;
pub use outcome::SubmissionOutcome;
pub use retry::{RetryDecision, RetryPolicy};
