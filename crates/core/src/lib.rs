pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod remote;
pub mod requests;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ReportTemplate,
    SanitizedConfig,
};
pub use orchestrator::{
    AlwaysContinue, ApiStatus, BatchPlanner, HaltReason, JobState, NeverContinue,
    OrchestratorConfig, OrchestratorError, OutcomeStatus, QuotaConfirmation, RateLimiter,
    ReportJob, ReportKind, ReportOrchestrator, ReportOutcome, ReportRequest, RunReport,
    RunSummary, SlotTracker,
};
pub use remote::{
    QualysClient, QuotaSnapshot, RemoteError, RemoteReportService, RemoteReportState,
    RunningReport,
};
pub use requests::{host_report_requests, scan_report_requests, select_templates, RequestError, ScanSelection};
pub use store::{
    RecordStatus, ReportRecord, ReportRecordStore, RunLogEntry, SqliteReportStore, StatusCounts,
    StoreError,
};
