//! Mock report record store for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::{RecordStatus, ReportRecord, ReportRecordStore, RunLogEntry, StatusCounts, StoreError};

/// In-memory implementation of the ReportRecordStore trait.
///
/// Keeps every write in call order so tests can check the sequence of
/// transitions, and can be told to fail writes.
#[derive(Debug, Default)]
pub struct MockRecordStore {
    records: Arc<RwLock<HashMap<String, ReportRecord>>>,
    writes: Arc<RwLock<Vec<(String, RecordStatus)>>>,
    runs: Arc<RwLock<Vec<RunLogEntry>>>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.write() {
            *flag = fail;
        }
    }

    /// Statuses written for `report_id`, in order.
    pub fn history(&self, report_id: &str) -> Vec<RecordStatus> {
        self.writes
            .read()
            .map(|writes| {
                writes
                    .iter()
                    .filter(|(id, _)| id == report_id)
                    .map(|(_, status)| *status)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.read().map(|w| w.len()).unwrap_or(0)
    }

    fn failing(&self) -> bool {
        self.fail_writes.read().map(|f| *f).unwrap_or(false)
    }
}

impl ReportRecordStore for MockRecordStore {
    fn upsert(&self, record: &ReportRecord) -> Result<(), StoreError> {
        if self.failing() {
            return Err(StoreError::Database("mock write failure".to_string()));
        }

        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut record = record.clone();
        if record.file_path.is_none() {
            record.file_path = records
                .get(&record.report_id)
                .and_then(|existing| existing.file_path.clone());
        }
        self.writes
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push((record.report_id.clone(), record.status));
        records.insert(record.report_id.clone(), record);
        Ok(())
    }

    fn get(&self, report_id: &str) -> Result<Option<ReportRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(report_id).cloned())
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut counts = StatusCounts::new();
        for record in records.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn record_run(&self, entry: &RunLogEntry) -> Result<(), StoreError> {
        if self.failing() {
            return Err(StoreError::Database("mock write failure".to_string()));
        }
        self.runs
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(entry.clone());
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>, StoreError> {
        let runs = self.runs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
