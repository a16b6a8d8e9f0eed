//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits,
//! allowing the orchestrator to be exercised without a real report service.
//!
//! # Example
//!
//! ```rust,ignore
//! use scanreports_core::testing::{fixtures, MockReportService, MockRecordStore};
//!
//! let service = Arc::new(MockReportService::new());
//! let store = Arc::new(MockRecordStore::new());
//!
//! // Configure mock responses
//! service.set_running_count(8).await;
//! service.script_status_for_title("Report 0", vec![Ok(RemoteReportState::Running)]).await;
//!
//! let orchestrator = ReportOrchestrator::new(
//!     fixtures::fast_config(), service, store, Arc::new(AlwaysContinue), "/tmp/reports",
//! );
//! ```

mod mock_record_store;
mod mock_report_service;

pub use mock_record_store::MockRecordStore;
pub use mock_report_service::{MockReportService, RecordedCreate};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::ReportTemplate;
    use crate::orchestrator::{OrchestratorConfig, ReportRequest};

    /// Orchestrator config with millisecond timings.
    pub fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_running_slots: 8,
            batch_size: 4,
            pause_between_creations_ms: 1,
            pause_between_batches_ms: 1,
            slot_poll_interval_ms: 10,
            status_poll_interval_ms: 10,
            max_wait_per_batch_ms: 2_000,
            max_wait_for_slots_ms: 100,
            single_slot_wait_ms: 50,
            rate_limit_cooldown_ms: 5,
            rate_limit_low_water: 10,
            rate_limit_critical_water: 5,
            running_preview_limit: 5,
        }
    }

    /// Scan-based request titled "Report {n}".
    pub fn scan_request(n: usize) -> ReportRequest {
        ReportRequest::scan(
            format!("scan/1714.{}", n),
            "91234",
            "pdf",
            format!("Report {}", n),
        )
    }

    /// `count` scan-based requests titled "Report 0" onwards.
    pub fn scan_requests(count: usize) -> Vec<ReportRequest> {
        (0..count).map(scan_request).collect()
    }

    /// Host-based request titled "Host report {n}".
    pub fn host_request(n: usize) -> ReportRequest {
        ReportRequest::host(format!("8000{}", n), "csv", format!("Host report {}", n))
    }

    pub fn template(template_id: &str, output_format: &str, description: &str) -> ReportTemplate {
        ReportTemplate {
            template_id: template_id.to_string(),
            output_format: output_format.to_string(),
            description: description.to_string(),
        }
    }
}
