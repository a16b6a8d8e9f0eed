//! Mock remote report service for testing.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::remote::{
    QuotaSnapshot, RemoteError, RemoteReportService, RemoteReportState, RunningReport,
};

/// A recorded successful creation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCreate {
    pub report_id: String,
    /// Scan reference, `None` for host-based reports.
    pub source_ref: Option<String>,
    pub template_id: String,
    pub output_format: String,
    pub title: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Scripted status answers for one report.
#[derive(Debug, Clone, Default)]
struct StatusScript {
    steps: VecDeque<Result<RemoteReportState, RemoteError>>,
    /// Last scripted state, repeated once the steps run out.
    last: Option<RemoteReportState>,
}

impl StatusScript {
    fn new(steps: Vec<Result<RemoteReportState, RemoteError>>) -> Self {
        Self {
            steps: steps.into(),
            last: None,
        }
    }

    fn next(&mut self, default: RemoteReportState) -> Result<RemoteReportState, RemoteError> {
        match self.steps.pop_front() {
            Some(Ok(state)) => {
                self.last = Some(state);
                Ok(state)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.unwrap_or(default)),
        }
    }
}

/// Mock implementation of the RemoteReportService trait.
///
/// Provides controllable behavior for testing:
/// - Scripted status sequences per report (by id or by title)
/// - Creation and download failures per title
/// - Scripted running counts and quota
/// - Recorded calls for assertions
///
/// Reports finish on their first status check unless scripted otherwise.
///
/// # Example
///
/// ```rust,ignore
/// let service = MockReportService::new();
///
/// // "Nightly" stays running forever
/// service.script_status_for_title("Nightly", vec![Ok(RemoteReportState::Running)]).await;
///
/// // Slots are full for two polls, then free up
/// service.script_running_counts(vec![Ok(8), Ok(8)]).await;
/// service.set_running_count(2).await;
/// ```
#[derive(Debug)]
pub struct MockReportService {
    created: Arc<RwLock<Vec<RecordedCreate>>>,
    create_attempts: Arc<RwLock<usize>>,
    id_counter: Arc<RwLock<u64>>,
    forced_ids: Arc<RwLock<VecDeque<String>>>,
    create_failures: Arc<RwLock<HashMap<String, RemoteError>>>,
    next_create_error: Arc<RwLock<Option<RemoteError>>>,
    /// Status scripts by report id.
    status_scripts: Arc<RwLock<HashMap<String, StatusScript>>>,
    /// Status scripts by title, attached to the report id on creation.
    title_scripts: Arc<RwLock<HashMap<String, StatusScript>>>,
    default_state: Arc<RwLock<RemoteReportState>>,
    status_checks: Arc<RwLock<Vec<String>>>,
    download_failures: Arc<RwLock<HashMap<String, RemoteError>>>,
    downloads: Arc<RwLock<Vec<String>>>,
    running_script: Arc<RwLock<VecDeque<Result<usize, RemoteError>>>>,
    running_count: Arc<RwLock<usize>>,
    running_count_queries: Arc<RwLock<usize>>,
    running_reports: Arc<RwLock<Vec<RunningReport>>>,
    running_list_queries: Arc<RwLock<usize>>,
    quota: std::sync::RwLock<QuotaSnapshot>,
    quota_after_create: Arc<RwLock<VecDeque<u32>>>,
    quota_after_running_count: Arc<RwLock<VecDeque<u32>>>,
}

impl Default for MockReportService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReportService {
    /// Create a new mock service with no running reports and unknown quota.
    pub fn new() -> Self {
        Self {
            created: Arc::new(RwLock::new(Vec::new())),
            create_attempts: Arc::new(RwLock::new(0)),
            id_counter: Arc::new(RwLock::new(1000)),
            forced_ids: Arc::new(RwLock::new(VecDeque::new())),
            create_failures: Arc::new(RwLock::new(HashMap::new())),
            next_create_error: Arc::new(RwLock::new(None)),
            status_scripts: Arc::new(RwLock::new(HashMap::new())),
            title_scripts: Arc::new(RwLock::new(HashMap::new())),
            default_state: Arc::new(RwLock::new(RemoteReportState::Finished)),
            status_checks: Arc::new(RwLock::new(Vec::new())),
            download_failures: Arc::new(RwLock::new(HashMap::new())),
            downloads: Arc::new(RwLock::new(Vec::new())),
            running_script: Arc::new(RwLock::new(VecDeque::new())),
            running_count: Arc::new(RwLock::new(0)),
            running_count_queries: Arc::new(RwLock::new(0)),
            running_reports: Arc::new(RwLock::new(Vec::new())),
            running_list_queries: Arc::new(RwLock::new(0)),
            quota: std::sync::RwLock::new(QuotaSnapshot::default()),
            quota_after_create: Arc::new(RwLock::new(VecDeque::new())),
            quota_after_running_count: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Reports created so far.
    pub async fn created_reports(&self) -> Vec<RecordedCreate> {
        self.created.read().await.clone()
    }

    /// Create calls so far, including failed ones.
    pub async fn create_attempts(&self) -> usize {
        *self.create_attempts.read().await
    }

    /// Make every creation titled `title` fail with `error`.
    pub async fn fail_create_for_title(&self, title: &str, error: RemoteError) {
        self.create_failures
            .write()
            .await
            .insert(title.to_string(), error);
    }

    /// Make the next creation fail with `error`.
    pub async fn set_next_create_error(&self, error: RemoteError) {
        *self.next_create_error.write().await = Some(error);
    }

    /// Hand out `report_id` on the next successful creation.
    pub async fn force_next_report_id(&self, report_id: &str) {
        self.forced_ids
            .write()
            .await
            .push_back(report_id.to_string());
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Script the status answers for a report id.
    pub async fn script_status(
        &self,
        report_id: &str,
        steps: Vec<Result<RemoteReportState, RemoteError>>,
    ) {
        self.status_scripts
            .write()
            .await
            .insert(report_id.to_string(), StatusScript::new(steps));
    }

    /// Script the status answers for the report created with `title`.
    pub async fn script_status_for_title(
        &self,
        title: &str,
        steps: Vec<Result<RemoteReportState, RemoteError>>,
    ) {
        self.title_scripts
            .write()
            .await
            .insert(title.to_string(), StatusScript::new(steps));
    }

    /// State returned for reports without a script.
    pub async fn set_default_state(&self, state: RemoteReportState) {
        *self.default_state.write().await = state;
    }

    /// Report ids checked so far, in call order.
    pub async fn status_checks(&self) -> Vec<String> {
        self.status_checks.read().await.clone()
    }

    pub async fn status_check_count(&self) -> usize {
        self.status_checks.read().await.len()
    }

    // =========================================================================
    // Download
    // =========================================================================

    /// Make downloads of the report titled `title` fail with `error`.
    pub async fn fail_download_for_title(&self, title: &str, error: RemoteError) {
        self.download_failures
            .write()
            .await
            .insert(title.to_string(), error);
    }

    /// Report ids passed to download, in call order.
    pub async fn download_calls(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }

    // =========================================================================
    // Slots and quota
    // =========================================================================

    /// Running count returned once the scripted counts run out.
    pub async fn set_running_count(&self, count: usize) {
        *self.running_count.write().await = count;
    }

    /// Answers for the next running-count queries, in order.
    pub async fn script_running_counts(&self, counts: Vec<Result<usize, RemoteError>>) {
        self.running_script.write().await.extend(counts);
    }

    pub async fn running_count_queries(&self) -> usize {
        *self.running_count_queries.read().await
    }

    pub async fn set_running_reports(&self, reports: Vec<RunningReport>) {
        *self.running_reports.write().await = reports;
    }

    pub async fn running_list_queries(&self) -> usize {
        *self.running_list_queries.read().await
    }

    /// Quota returned by `last_observed_quota`.
    pub fn set_quota(&self, quota: QuotaSnapshot) {
        if let Ok(mut current) = self.quota.write() {
            *current = quota;
        }
    }

    /// Remaining quota observed after each of the next successful creations.
    pub async fn script_quota_after_create(&self, remaining: Vec<u32>) {
        self.quota_after_create.write().await.extend(remaining);
    }

    /// Remaining quota observed after each of the next running-count queries.
    pub async fn script_quota_after_running_count(&self, remaining: Vec<u32>) {
        self.quota_after_running_count.write().await.extend(remaining);
    }

    async fn next_report_id(&self) -> String {
        if let Some(id) = self.forced_ids.write().await.pop_front() {
            return id;
        }
        let mut counter = self.id_counter.write().await;
        *counter += 1;
        counter.to_string()
    }

    async fn title_of(&self, report_id: &str) -> Option<RecordedCreate> {
        self.created
            .read()
            .await
            .iter()
            .rev()
            .find(|c| c.report_id == report_id)
            .cloned()
    }

    async fn create(
        &self,
        source_ref: Option<&str>,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError> {
        *self.create_attempts.write().await += 1;

        if let Some(err) = self.next_create_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self.create_failures.read().await.get(title) {
            return Err(err.clone());
        }

        let report_id = self.next_report_id().await;
        self.created.write().await.push(RecordedCreate {
            report_id: report_id.clone(),
            source_ref: source_ref.map(str::to_string),
            template_id: template_id.to_string(),
            output_format: output_format.to_string(),
            title: title.to_string(),
            timestamp: Utc::now(),
        });

        if let Some(script) = self.title_scripts.read().await.get(title) {
            self.status_scripts
                .write()
                .await
                .entry(report_id.clone())
                .or_insert_with(|| script.clone());
        }

        if let Some(remaining) = self.quota_after_create.write().await.pop_front() {
            self.set_quota(QuotaSnapshot::new(remaining));
        }

        Ok(report_id)
    }
}

#[async_trait]
impl RemoteReportService for MockReportService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_scan_report(
        &self,
        source_ref: &str,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError> {
        self.create(Some(source_ref), template_id, output_format, title)
            .await
    }

    async fn create_host_report(
        &self,
        template_id: &str,
        output_format: &str,
        title: &str,
    ) -> Result<String, RemoteError> {
        self.create(None, template_id, output_format, title).await
    }

    async fn check_status(&self, report_id: &str) -> Result<RemoteReportState, RemoteError> {
        self.status_checks.write().await.push(report_id.to_string());

        let default = *self.default_state.read().await;
        let mut scripts = self.status_scripts.write().await;
        match scripts.get_mut(report_id) {
            Some(script) => script.next(default),
            None => Ok(default),
        }
    }

    async fn download(
        &self,
        report_id: &str,
        destination: &Path,
    ) -> Result<PathBuf, RemoteError> {
        self.downloads.write().await.push(report_id.to_string());

        let created = self
            .title_of(report_id)
            .await
            .ok_or_else(|| RemoteError::NotFound(report_id.to_string()))?;

        if let Some(err) = self.download_failures.read().await.get(&created.title) {
            return Err(err.clone());
        }

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;
        let path = destination.join(format!(
            "{}_{}.{}",
            created.title.replace(' ', "_"),
            report_id,
            created.output_format.to_lowercase()
        ));
        tokio::fs::write(&path, format!("mock report {}", report_id))
            .await
            .map_err(|e| RemoteError::Io(e.to_string()))?;

        Ok(path)
    }

    async fn count_running_jobs(&self) -> Result<usize, RemoteError> {
        *self.running_count_queries.write().await += 1;
        if let Some(remaining) = self.quota_after_running_count.write().await.pop_front() {
            self.set_quota(QuotaSnapshot::new(remaining));
        }

        if let Some(next) = self.running_script.write().await.pop_front() {
            return next;
        }
        Ok(*self.running_count.read().await)
    }

    async fn list_running_reports(&self, limit: usize) -> Result<Vec<RunningReport>, RemoteError> {
        *self.running_list_queries.write().await += 1;
        Ok(self
            .running_reports
            .read()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_observed_quota(&self) -> QuotaSnapshot {
        self.quota.read().map(|q| *q).unwrap_or_default()
    }
}
