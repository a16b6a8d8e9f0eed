//! SQLite-backed report record store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{RecordStatus, ReportRecord, ReportRecordStore, RunLogEntry, StatusCounts, StoreError};

/// SQLite-backed report record store.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS report_records (
                report_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_ref TEXT,
                template_id TEXT NOT NULL,
                output_format TEXT NOT NULL,
                status TEXT NOT NULL,
                file_path TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_report_records_status ON report_records(status);

            CREATE TABLE IF NOT EXISTS run_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT,
                records_processed INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ReportRecord> {
        let status: String = row.get(6)?;
        let file_path: Option<String> = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(ReportRecord {
            report_id: row.get(0)?,
            title: row.get(1)?,
            kind: row.get(2)?,
            source_ref: row.get(3)?,
            template_id: row.get(4)?,
            output_format: row.get(5)?,
            // Unknown statuses only come from hand-edited databases
            status: RecordStatus::parse(&status).unwrap_or(RecordStatus::Error),
            file_path: file_path.map(PathBuf::from),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunLogEntry> {
        let started_at: String = row.get(4)?;
        let finished_at: String = row.get(5)?;

        Ok(RunLogEntry {
            operation: row.get(0)?,
            status: row.get(1)?,
            details: row.get(2)?,
            records_processed: row.get(3)?,
            started_at: Self::parse_timestamp(&started_at),
            finished_at: Self::parse_timestamp(&finished_at),
        })
    }
}

impl ReportRecordStore for SqliteReportStore {
    fn upsert(&self, record: &ReportRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO report_records
                (report_id, title, kind, source_ref, template_id, output_format, status, file_path, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(report_id) DO UPDATE SET
                title = excluded.title,
                kind = excluded.kind,
                source_ref = excluded.source_ref,
                template_id = excluded.template_id,
                output_format = excluded.output_format,
                status = excluded.status,
                file_path = COALESCE(excluded.file_path, report_records.file_path),
                updated_at = excluded.updated_at
            "#,
            params![
                record.report_id,
                record.title,
                record.kind,
                record.source_ref,
                record.template_id,
                record.output_format,
                record.status.as_str(),
                record
                    .file_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get(&self, report_id: &str) -> Result<Option<ReportRecord>, StoreError> {
        let conn = self.lock()?;

        let result = conn.query_row(
            "SELECT report_id, title, kind, source_ref, template_id, output_format, status, file_path, updated_at FROM report_records WHERE report_id = ?",
            params![report_id],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM report_records GROUP BY status")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut counts = StatusCounts::new();
        for row in rows {
            let (status, count) = row.map_err(|e| StoreError::Database(e.to_string()))?;
            if let Some(status) = RecordStatus::parse(&status) {
                *counts.entry(status).or_insert(0) += count.max(0) as u64;
            }
        }
        Ok(counts)
    }

    fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO run_log (operation, status, details, records_processed, started_at, finished_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.operation,
                entry.status,
                entry.details,
                entry.records_processed,
                entry.started_at.to_rfc3339(),
                entry.finished_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT operation, status, details, records_processed, started_at, finished_at FROM run_log ORDER BY id DESC LIMIT ?",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(runs)
    }
}
