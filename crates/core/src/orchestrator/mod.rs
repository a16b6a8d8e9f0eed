//! Report orchestrator for bulk report generation.
//!
//! The orchestrator drives report requests through their lifecycle:
//! - **Planning**: requests are split into batches no larger than the slot maximum
//! - **Admission**: a batch starts once enough report slots are free
//! - **Creation**: sequential and paced, gated on the remaining request quota
//! - **Polling**: one status check per active report per sweep, shared batch deadline
//! - **Download**: every finished report is fetched into the download directory

mod config;
mod planner;
mod rate_limit;
mod runner;
mod slots;
mod types;

pub use config::OrchestratorConfig;
pub use planner::BatchPlanner;
pub use rate_limit::{AlwaysContinue, NeverContinue, QuotaCheck, QuotaConfirmation, RateLimiter};
pub use runner::ReportOrchestrator;
pub use slots::SlotTracker;
pub use types::{
    ApiStatus, HaltReason, JobState, OrchestratorError, OutcomeStatus, ReportJob, ReportKind,
    ReportOutcome, ReportRequest, RunReport, RunSummary,
};
