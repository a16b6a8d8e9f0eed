//! Report records, persisted as the orchestrator moves jobs through their states.

mod record;
mod sqlite_store;

pub use record::{
    RecordStatus, ReportRecord, ReportRecordStore, RunLogEntry, StatusCounts, StoreError,
};
pub use sqlite_store::SqliteReportStore;
