//! Types for remote report service operations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the remote report service.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Concurrent report limit reached: {0}")]
    ConcurrencyLimited(String),

    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Unparseable response: {0}")]
    Parse(String),

    #[error("API error {code}: {message}")]
    Api { code: u32, message: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl RemoteError {
    /// Whether the service refused the call because of its request quota.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }

    /// Whether the error must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Authentication(_))
    }
}

/// Remote state of a report as reported by a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteReportState {
    /// Queued or being generated.
    Running,
    /// Ready to be fetched.
    Finished,
    /// Generation failed server-side.
    Error,
    /// Cancelled server-side.
    Cancelled,
}

impl RemoteReportState {
    /// Map the service's state text onto a remote state.
    ///
    /// Anything the service reports that is not one of the terminal states is
    /// treated as still running.
    pub fn from_api(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "finished" => RemoteReportState::Finished,
            "error" | "errors" => RemoteReportState::Error,
            "cancelled" | "canceled" => RemoteReportState::Cancelled,
            _ => RemoteReportState::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteReportState::Running => "running",
            RemoteReportState::Finished => "finished",
            RemoteReportState::Error => "error",
            RemoteReportState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteReportState::Running)
    }
}

/// Request quota last observed on a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Remaining requests in the current window, unknown until the first response.
    pub remaining: Option<u32>,
    /// When the window resets, if the service said so.
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaSnapshot {
    pub fn new(remaining: u32) -> Self {
        Self {
            remaining: Some(remaining),
            reset_at: None,
        }
    }
}

/// A report currently running on the service (observability only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningReport {
    pub id: String,
    pub title: String,
}

/// Trait for remote report services.
#[async_trait]
pub trait RemoteReportService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &str;

    /// Launch a report over a single scan.
    async fn create_scan_report(
        &self,
        source_ref: &str,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError>;

    /// Launch a host-based report.
    async fn create_host_report(
        &self,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError>;

    /// Check the state of a launched report.
    async fn check_status(&self, report_id: &str) -> Result<RemoteReportState, RemoteError>;

    /// Fetch a finished report into `destination`, returning the written file.
    async fn download(&self, report_id: &str, destination: &Path)
        -> Result<PathBuf, RemoteError>;

    /// Number of reports currently running on the service.
    async fn count_running_jobs(&self) -> Result<usize, RemoteError>;

    /// Up to `limit` running reports.
    async fn list_running_reports(&self, limit: usize) -> Result<Vec<RunningReport>, RemoteError>;

    /// Quota observed on the most recent response.
    fn last_observed_quota(&self) -> QuotaSnapshot;
}
