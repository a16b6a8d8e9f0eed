//! Report record types and the store trait.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::{JobState, ReportJob};

/// Errors from the record store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("record store lock poisoned")]
    LockPoisoned,
}

/// Persisted status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Created,
    Running,
    Finished,
    Downloaded,
    DownloadFailed,
    Error,
    Cancelled,
    Timeout,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Created => "created",
            RecordStatus::Running => "running",
            RecordStatus::Finished => "finished",
            RecordStatus::Downloaded => "downloaded",
            RecordStatus::DownloadFailed => "download_failed",
            RecordStatus::Error => "error",
            RecordStatus::Cancelled => "cancelled",
            RecordStatus::Timeout => "timeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(RecordStatus::Created),
            "running" => Some(RecordStatus::Running),
            "finished" => Some(RecordStatus::Finished),
            "downloaded" => Some(RecordStatus::Downloaded),
            "download_failed" => Some(RecordStatus::DownloadFailed),
            "error" => Some(RecordStatus::Error),
            "cancelled" => Some(RecordStatus::Cancelled),
            "timeout" => Some(RecordStatus::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<JobState> for RecordStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Created => RecordStatus::Created,
            JobState::Running => RecordStatus::Running,
            JobState::Finished => RecordStatus::Finished,
            JobState::Downloaded => RecordStatus::Downloaded,
            JobState::DownloadFailed => RecordStatus::DownloadFailed,
            JobState::Error => RecordStatus::Error,
            JobState::Cancelled => RecordStatus::Cancelled,
            JobState::TimedOut => RecordStatus::Timeout,
        }
    }
}

/// Persisted view of one created report, keyed by its remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub report_id: String,
    pub title: String,
    /// "scan" or "host".
    pub kind: String,
    pub source_ref: Option<String>,
    pub template_id: String,
    pub output_format: String,
    pub status: RecordStatus,
    /// Path of the downloaded file. `None` never clears a stored path.
    pub file_path: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl ReportRecord {
    /// Snapshot of a job's current state.
    pub fn from_job(job: &ReportJob) -> Self {
        Self {
            report_id: job.remote_report_id.clone(),
            title: job.request.title.clone(),
            kind: job.request.kind.as_str().to_string(),
            source_ref: job.request.source_ref().map(str::to_string),
            template_id: job.request.template_id.clone(),
            output_format: job.request.output_format.clone(),
            status: job.state.into(),
            file_path: job.file_path.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// One entry of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// What was run, e.g. "scan_reports".
    pub operation: String,
    /// "success", "partial", "failed" or "halted".
    pub status: String,
    pub details: Option<String>,
    pub records_processed: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Count of records per status.
pub type StatusCounts = BTreeMap<RecordStatus, u64>;

/// Trait for report record storage backends.
///
/// Writes are upserts keyed by report id, last write wins.
pub trait ReportRecordStore: Send + Sync {
    /// Insert or update a record.
    fn upsert(&self, record: &ReportRecord) -> Result<(), StoreError>;

    /// Get a record by report id.
    fn get(&self, report_id: &str) -> Result<Option<ReportRecord>, StoreError>;

    /// Number of records per status.
    fn status_counts(&self) -> Result<StatusCounts, StoreError>;

    /// Append a run log entry.
    fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError>;

    /// Most recent run log entries, newest first.
    fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ReportRequest;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            RecordStatus::Created,
            RecordStatus::Downloaded,
            RecordStatus::DownloadFailed,
            RecordStatus::Timeout,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("bogus"), None);
    }

    #[test]
    fn test_record_from_job() {
        let request = ReportRequest::scan("scan/1.1", "123", "pdf", "Perimeter");
        let mut job = ReportJob::new("555", 0, request);
        job.transition(JobState::TimedOut).unwrap();

        let record = ReportRecord::from_job(&job);
        assert_eq!(record.report_id, "555");
        assert_eq!(record.kind, "scan");
        assert_eq!(record.source_ref.as_deref(), Some("scan/1.1"));
        assert_eq!(record.status, RecordStatus::Timeout);
        assert!(record.file_path.is_none());
    }
}
