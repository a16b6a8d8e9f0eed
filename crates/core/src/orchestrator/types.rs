//! Types for the report orchestrator.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::{QuotaSnapshot, RemoteError, RunningReport};
use crate::store::StoreError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Remaining quota is below the critical mark and continuing was declined.
    #[error("request quota exhausted ({remaining} requests remaining)")]
    QuotaExhausted { remaining: u32 },

    /// The service rejected the credentials; the whole run stops.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Not enough report slots freed up in time.
    #[error("no report slot available for {required} report(s)")]
    SlotUnavailable { required: usize },

    /// The service itself reported the report as failed.
    #[error("report {report_id} ended remotely as {state}")]
    RemoteJobFailed { report_id: String, state: JobState },

    /// The batch deadline elapsed before the report resolved.
    #[error("report {report_id} did not finish before the batch deadline")]
    Timeout { report_id: String },

    /// The report finished but could not be fetched.
    #[error("report {report_id} could not be downloaded: {reason}")]
    DownloadFailure { report_id: String, reason: String },

    /// A job was asked to move backwards or out of a terminal state.
    #[error("invalid transition for report {report_id}: {from} -> {to}")]
    InvalidTransition {
        report_id: String,
        from: JobState,
        to: JobState,
    },

    /// Record store error.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// Remote service error.
    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
}

/// What a report is generated over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportKind {
    /// Report over the results of one scan.
    Scan { source_ref: String },
    /// Report over hosts, independent of a single scan.
    Host,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Scan { .. } => "scan",
            ReportKind::Host => "host",
        }
    }
}

/// A caller-supplied intent to generate one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub template_id: String,
    pub output_format: String,
    pub title: String,
}

impl ReportRequest {
    /// Scan-based report request.
    pub fn scan(
        source_ref: impl Into<String>,
        template_id: impl Into<String>,
        output_format: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            kind: ReportKind::Scan {
                source_ref: source_ref.into(),
            },
            template_id: template_id.into(),
            output_format: output_format.into(),
            title: title.into(),
        }
    }

    /// Host-based report request.
    pub fn host(
        template_id: impl Into<String>,
        output_format: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            kind: ReportKind::Host,
            template_id: template_id.into(),
            output_format: output_format.into(),
            title: title.into(),
        }
    }

    /// Scan reference, for scan-based requests.
    pub fn source_ref(&self) -> Option<&str> {
        match &self.kind {
            ReportKind::Scan { source_ref } => Some(source_ref),
            ReportKind::Host => None,
        }
    }
}

/// Lifecycle state of a created report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Finished,
    Error,
    Cancelled,
    TimedOut,
    DownloadFailed,
    Downloaded,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
            JobState::TimedOut => "timed_out",
            JobState::DownloadFailed => "download_failed",
            JobState::Downloaded => "downloaded",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Error
                | JobState::Cancelled
                | JobState::TimedOut
                | JobState::DownloadFailed
                | JobState::Downloaded
        )
    }

    /// Still waiting on the service.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Created | JobState::Running)
    }

    /// Whether `next` is a legal forward move from this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created | Running, Running | Finished | Error | Cancelled | TimedOut) => true,
            (Finished, Downloaded | DownloadFailed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A report accepted by the service, owned by the run that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    /// Identifier assigned by the service.
    pub remote_report_id: String,
    /// Position of the originating request in the run input.
    pub request_index: usize,
    pub request: ReportRequest,
    pub state: JobState,
    /// Set only after a successful download.
    pub file_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    /// Last error seen for this job, if any.
    pub last_error: Option<String>,
}

impl ReportJob {
    pub fn new(
        remote_report_id: impl Into<String>,
        request_index: usize,
        request: ReportRequest,
    ) -> Self {
        Self {
            remote_report_id: remote_report_id.into(),
            request_index,
            request,
            state: JobState::Created,
            file_path: None,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    /// Move the job forward. Rejects backwards moves and moves out of terminal states.
    pub fn transition(&mut self, next: JobState) -> Result<(), OrchestratorError> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                report_id: self.remote_report_id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Final outcome of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Downloaded,
    DownloadFailed,
    /// The service reported the report as errored.
    RemoteError,
    Cancelled,
    TimedOut,
    CreateFailed,
    NotAttempted,
    /// Created remotely, but the run halted before the report resolved.
    Abandoned,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Downloaded => "downloaded",
            OutcomeStatus::DownloadFailed => "download_failed",
            OutcomeStatus::RemoteError => "remote_error",
            OutcomeStatus::Cancelled => "cancelled",
            OutcomeStatus::TimedOut => "timed_out",
            OutcomeStatus::CreateFailed => "create_failed",
            OutcomeStatus::NotAttempted => "not_attempted",
            OutcomeStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Downloaded)
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeStatus::Downloaded | OutcomeStatus::NotAttempted)
    }

    /// Outcome for a job in a terminal state.
    pub fn from_terminal(state: JobState) -> Option<Self> {
        match state {
            JobState::Downloaded => Some(OutcomeStatus::Downloaded),
            JobState::DownloadFailed => Some(OutcomeStatus::DownloadFailed),
            JobState::Error => Some(OutcomeStatus::RemoteError),
            JobState::Cancelled => Some(OutcomeStatus::Cancelled),
            JobState::TimedOut => Some(OutcomeStatus::TimedOut),
            JobState::Created | JobState::Running | JobState::Finished => None,
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of a single request, as returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub request: ReportRequest,
    /// Service-assigned id, when the report was created.
    pub report_id: Option<String>,
    pub status: OutcomeStatus,
    pub file_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl ReportOutcome {
    pub fn not_attempted(request: ReportRequest) -> Self {
        Self {
            request,
            report_id: None,
            status: OutcomeStatus::NotAttempted,
            file_path: None,
            error: None,
        }
    }

    pub fn create_failed(request: ReportRequest, error: impl Into<String>) -> Self {
        Self {
            request,
            report_id: None,
            status: OutcomeStatus::CreateFailed,
            file_path: None,
            error: Some(error.into()),
        }
    }

    /// Outcome of a job that reached a terminal state.
    pub fn from_job(job: ReportJob) -> Self {
        let status = OutcomeStatus::from_terminal(job.state).unwrap_or(OutcomeStatus::Abandoned);
        Self {
            request: job.request,
            report_id: Some(job.remote_report_id),
            status,
            file_path: job.file_path,
            error: job.last_error,
        }
    }
}

/// Why a run stopped before processing every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    QuotaExhausted { remaining: u32 },
    AuthenticationFailed { message: String },
}

/// Counts of outcomes in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

/// Result of an orchestration run.
///
/// Every submitted request appears exactly once in `outcomes`, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier of the run, for correlating log lines.
    pub run_id: String,
    pub outcomes: Vec<ReportOutcome>,
    pub batches: usize,
    pub halted: Option<HaltReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            if outcome.status.is_success() {
                summary.succeeded += 1;
            } else if outcome.status.is_failure() {
                summary.failed += 1;
            } else {
                summary.not_attempted += 1;
            }
        }
        summary
    }

    /// The run-terminating error, if the run halted.
    pub fn error(&self) -> Option<OrchestratorError> {
        self.halted.as_ref().map(|reason| match reason {
            HaltReason::QuotaExhausted { remaining } => OrchestratorError::QuotaExhausted {
                remaining: *remaining,
            },
            HaltReason::AuthenticationFailed { message } => {
                OrchestratorError::Authentication(message.clone())
            }
        })
    }
}

/// Snapshot of the service's capacity, for display.
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatus {
    pub quota: QuotaSnapshot,
    pub running: usize,
    pub max_slots: usize,
    pub available_slots: usize,
    /// Preview of the running reports, bounded by the configured limit.
    pub running_reports: Vec<RunningReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [JobState; 8] = [
        JobState::Created,
        JobState::Running,
        JobState::Finished,
        JobState::Error,
        JobState::Cancelled,
        JobState::TimedOut,
        JobState::DownloadFailed,
        JobState::Downloaded,
    ];

    fn scan_request() -> ReportRequest {
        ReportRequest::scan("scan/1714.123", "91234", "pdf", "DMZ weekly")
    }

    #[test]
    fn test_request_constructors() {
        let scan = scan_request();
        assert_eq!(scan.source_ref(), Some("scan/1714.123"));
        assert_eq!(scan.kind.as_str(), "scan");

        let host = ReportRequest::host("80001", "csv", "All hosts");
        assert_eq!(host.source_ref(), None);
        assert_eq!(host.kind.as_str(), "host");
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for to in ALL_STATES {
                assert!(
                    !from.can_transition_to(to),
                    "{} should not move to {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_no_transition_back_to_active() {
        for from in ALL_STATES {
            assert!(!from.can_transition_to(JobState::Created));
        }
        assert!(!JobState::Finished.can_transition_to(JobState::Running));
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobState::Created.can_transition_to(JobState::Running));
        assert!(JobState::Created.can_transition_to(JobState::Finished));
        assert!(JobState::Running.can_transition_to(JobState::Error));
        assert!(JobState::Running.can_transition_to(JobState::TimedOut));
        assert!(JobState::Finished.can_transition_to(JobState::Downloaded));
        assert!(JobState::Finished.can_transition_to(JobState::DownloadFailed));
        assert!(!JobState::Created.can_transition_to(JobState::Downloaded));
        assert!(!JobState::Finished.can_transition_to(JobState::TimedOut));
    }

    #[test]
    fn test_job_transition_rejects_invalid() {
        let mut job = ReportJob::new("100", 0, scan_request());
        job.transition(JobState::Finished).unwrap();
        job.transition(JobState::Downloaded).unwrap();

        let err = job.transition(JobState::Running).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(job.state, JobState::Downloaded);
        assert_eq!(
            err.to_string(),
            "invalid transition for report 100: downloaded -> running"
        );
    }

    #[test]
    fn test_outcome_from_job() {
        let mut job = ReportJob::new("100", 0, scan_request());
        job.transition(JobState::TimedOut).unwrap();
        let outcome = ReportOutcome::from_job(job);
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert_eq!(outcome.report_id.as_deref(), Some("100"));

        let job = ReportJob::new("101", 1, scan_request());
        assert_eq!(ReportOutcome::from_job(job).status, OutcomeStatus::Abandoned);
    }

    #[test]
    fn test_run_summary_counts() {
        let now = Utc::now();
        let mut downloaded = ReportOutcome::not_attempted(scan_request());
        downloaded.status = OutcomeStatus::Downloaded;

        let report = RunReport {
            run_id: "run-1".to_string(),
            outcomes: vec![
                downloaded,
                ReportOutcome::create_failed(scan_request(), "boom"),
                ReportOutcome::not_attempted(scan_request()),
            ],
            batches: 1,
            halted: None,
            started_at: now,
            finished_at: now,
        };

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_attempted, 1);
        assert!(report.error().is_none());
    }

    #[test]
    fn test_halt_reason_to_error() {
        let now = Utc::now();
        let report = RunReport {
            run_id: "run-2".to_string(),
            outcomes: vec![],
            batches: 0,
            halted: Some(HaltReason::QuotaExhausted { remaining: 3 }),
            started_at: now,
            finished_at: now,
        };
        assert!(matches!(
            report.error(),
            Some(OrchestratorError::QuotaExhausted { remaining: 3 })
        ));
    }

    #[test]
    fn test_outcome_status_serialization() {
        assert_eq!(
            serde_json::to_string(&OutcomeStatus::NotAttempted).unwrap(),
            "\"not_attempted\""
        );
        assert_eq!(
            serde_json::to_string(&JobState::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
