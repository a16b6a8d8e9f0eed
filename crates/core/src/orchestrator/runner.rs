//! Report orchestrator implementation.
//!
//! Drives report requests through create, poll and download, one batch at a time:
//! - Admission: wait for enough free slots, degrading to one slot per report
//! - Creation: sequential, paced, gated on the request quota
//! - Polling: breadth-first sweeps over the batch under a shared deadline
//! - Download: every report that finished

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::remote::{RemoteError, RemoteReportService, RemoteReportState};
use crate::store::{ReportRecord, ReportRecordStore};

use super::config::OrchestratorConfig;
use super::planner::BatchPlanner;
use super::rate_limit::{QuotaConfirmation, RateLimiter};
use super::slots::SlotTracker;
use super::types::{
    ApiStatus, HaltReason, JobState, OrchestratorError, ReportJob, ReportKind, ReportOutcome,
    ReportRequest, RunReport,
};

/// State owned by a single run.
struct RunState {
    outcomes: Vec<Option<ReportOutcome>>,
    limiter: RateLimiter,
    halted: Option<HaltReason>,
    batches: usize,
    /// Every report id handed out by the service during this run.
    seen_ids: HashSet<String>,
}

impl RunState {
    fn auth_halted(&self) -> bool {
        matches!(self.halted, Some(HaltReason::AuthenticationFailed { .. }))
    }

    fn halt_on(&mut self, error: &RemoteError) {
        if self.halted.is_none() {
            self.halted = Some(HaltReason::AuthenticationFailed {
                message: error.to_string(),
            });
        }
    }
}

/// The report orchestrator: turns a list of report requests into a bounded,
/// slot-aware, quota-aware sequence of create, poll and download calls.
pub struct ReportOrchestrator {
    config: OrchestratorConfig,
    service: Arc<dyn RemoteReportService>,
    store: Arc<dyn ReportRecordStore>,
    confirmation: Arc<dyn QuotaConfirmation>,
    slots: SlotTracker,
    download_dir: PathBuf,
}

impl ReportOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        service: Arc<dyn RemoteReportService>,
        store: Arc<dyn ReportRecordStore>,
        confirmation: Arc<dyn QuotaConfirmation>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        let slots = SlotTracker::new(
            service.clone(),
            config.max_running_slots,
            config.running_preview_limit,
        );

        Self {
            config,
            service,
            store,
            confirmation,
            slots,
            download_dir: download_dir.into(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn slots(&self) -> &SlotTracker {
        &self.slots
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Current quota, running reports and free slots.
    pub async fn api_status(&self) -> Result<ApiStatus, OrchestratorError> {
        let running = self.service.count_running_jobs().await?;
        let running_reports = self.slots.running_preview().await;

        Ok(ApiStatus {
            quota: self.service.last_observed_quota(),
            running,
            max_slots: self.config.max_running_slots,
            available_slots: self.config.max_running_slots.saturating_sub(running),
            running_reports,
        })
    }

    /// Block until `required` slots are free or the configured slot wait elapses.
    pub async fn wait_for_slots(&self, required: usize) -> bool {
        self.slots
            .await_slots(
                required,
                self.config.max_wait_for_slots(),
                self.config.slot_poll_interval(),
            )
            .await
    }

    /// Process every request, batch by batch.
    ///
    /// Every request appears exactly once in the returned outcomes, in input
    /// order. Only an authentication failure or a declined quota confirmation
    /// stops the run early; the remaining requests are then `NotAttempted`.
    pub async fn run(&self, requests: Vec<ReportRequest>) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let batch_size = self.config.effective_batch_size();
        let batches = BatchPlanner::plan_ranges(requests.len(), batch_size);
        let total_batches = batches.len();

        info!(
            run_id = %run_id,
            service = self.service.name(),
            requests = requests.len(),
            batches = total_batches,
            batch_size,
            "Starting report run"
        );

        let mut state = RunState {
            outcomes: vec![None; requests.len()],
            limiter: RateLimiter::from_config(&self.config),
            halted: None,
            batches: 0,
            seen_ids: HashSet::new(),
        };

        for (batch_idx, range) in batches.into_iter().enumerate() {
            if state.halted.is_some() {
                break;
            }
            if batch_idx > 0 {
                tokio::time::sleep(self.config.pause_between_batches()).await;
            }
            self.process_batch(batch_idx + 1, total_batches, &requests, range, &mut state)
                .await;
        }

        let outcomes: Vec<ReportOutcome> = state
            .outcomes
            .into_iter()
            .zip(requests)
            .map(|(outcome, request)| {
                outcome.unwrap_or_else(|| ReportOutcome::not_attempted(request))
            })
            .collect();

        for outcome in &outcomes {
            metrics::REPORT_OUTCOMES
                .with_label_values(&[outcome.status.as_str()])
                .inc();
        }

        let report = RunReport {
            run_id,
            outcomes,
            batches: state.batches,
            halted: state.halted,
            started_at,
            finished_at: Utc::now(),
        };

        let summary = report.summary();
        match &report.halted {
            Some(reason) => warn!(
                run_id = %report.run_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                not_attempted = summary.not_attempted,
                reason = ?reason,
                "Report run halted"
            ),
            None => info!(
                run_id = %report.run_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                not_attempted = summary.not_attempted,
                batches = report.batches,
                "Report run complete"
            ),
        }

        report
    }

    async fn process_batch(
        &self,
        batch_no: usize,
        total_batches: usize,
        requests: &[ReportRequest],
        range: Range<usize>,
        state: &mut RunState,
    ) {
        let size = range.len();
        info!(batch = batch_no, of = total_batches, size, "Processing batch");

        if !self.gate_quota(state).await {
            return;
        }
        state.batches += 1;
        metrics::BATCHES_PROCESSED.inc();

        // Admission
        let batch_admitted = self
            .slots
            .await_slots(
                size,
                self.config.max_wait_for_slots(),
                self.config.slot_poll_interval(),
            )
            .await;
        if !batch_admitted {
            warn!(
                batch = batch_no,
                error = %OrchestratorError::SlotUnavailable { required: size },
                "Falling back to single-report admission"
            );
        }

        // Creation
        let mut jobs = Vec::with_capacity(size);
        for (position, index) in range.enumerate() {
            if !batch_admitted
                && !self
                    .slots
                    .await_slots(
                        1,
                        self.config.single_slot_wait(),
                        self.config.slot_poll_interval(),
                    )
                    .await
            {
                warn!(
                    batch = batch_no,
                    error = %OrchestratorError::SlotUnavailable { required: 1 },
                    "Stopping batch, remaining requests not attempted"
                );
                break;
            }
            if position > 0 {
                tokio::time::sleep(self.config.pause_between_creations()).await;
            }
            // Slot polling may have observed a lower quota
            if !self.gate_quota(state).await {
                break;
            }

            let request = &requests[index];
            if let Some(job) = self.create_job(index, request, state).await {
                jobs.push(job);
            }
            if state.auth_halted() {
                break;
            }
        }

        // Polling and download
        if !jobs.is_empty() && !state.auth_halted() {
            self.poll_until_resolved(batch_no, &mut jobs, state).await;
        }
        if !state.auth_halted() {
            self.download_finished(&mut jobs, state).await;
        }

        // Aggregation
        let mut downloaded = 0;
        for job in jobs {
            if job.state == JobState::Downloaded {
                downloaded += 1;
            }
            let index = job.request_index;
            state.outcomes[index] = Some(ReportOutcome::from_job(job));
        }
        info!(batch = batch_no, size, downloaded, "Batch finished");
    }

    /// Check the quota before issuing a request. Returns `false` and halts the
    /// run if continuing below the critical mark was declined.
    async fn gate_quota(&self, state: &mut RunState) -> bool {
        state.limiter.observe(self.service.last_observed_quota());
        match state.limiter.admit(self.confirmation.as_ref()).await {
            Ok(_) => true,
            Err(e) => {
                let remaining = match e {
                    OrchestratorError::QuotaExhausted { remaining } => remaining,
                    other => {
                        error!(error = %other, "Quota check failed, stopping run");
                        state.limiter.remaining().unwrap_or(0)
                    }
                };
                state.halted = Some(HaltReason::QuotaExhausted { remaining });
                false
            }
        }
    }

    /// Issue one create call. Failures are recorded as the request's outcome.
    async fn create_job(
        &self,
        index: usize,
        request: &ReportRequest,
        state: &mut RunState,
    ) -> Option<ReportJob> {
        let result = match &request.kind {
            ReportKind::Scan { source_ref } => {
                self.service
                    .create_scan_report(
                        source_ref,
                        &request.template_id,
                        &request.output_format,
                        &request.title,
                    )
                    .await
            }
            ReportKind::Host => {
                self.service
                    .create_host_report(&request.template_id, &request.output_format, &request.title)
                    .await
            }
        };
        state.limiter.observe(self.service.last_observed_quota());

        match result {
            Ok(report_id) if !state.seen_ids.insert(report_id.clone()) => {
                error!(report_id = %report_id, title = %request.title, "Service reused a report id");
                metrics::CREATION_FAILURES.with_label_values(&["other"]).inc();
                state.outcomes[index] = Some(ReportOutcome::create_failed(
                    request.clone(),
                    format!("duplicate report id {}", report_id),
                ));
                None
            }
            Ok(report_id) => {
                info!(
                    report_id = %report_id,
                    kind = request.kind.as_str(),
                    template_id = %request.template_id,
                    title = %request.title,
                    "Report created"
                );
                metrics::REPORTS_CREATED
                    .with_label_values(&[request.kind.as_str()])
                    .inc();
                let job = ReportJob::new(report_id, index, request.clone());
                self.persist(&job);
                Some(job)
            }
            Err(e) => {
                state.outcomes[index] =
                    Some(ReportOutcome::create_failed(request.clone(), e.to_string()));

                if e.is_fatal() {
                    metrics::CREATION_FAILURES
                        .with_label_values(&["authentication"])
                        .inc();
                    error!(title = %request.title, error = %e, "Authentication failed, stopping run");
                    state.halt_on(&e);
                } else if e.is_rate_limited() {
                    metrics::CREATION_FAILURES
                        .with_label_values(&["rate_limited"])
                        .inc();
                    metrics::RATE_LIMIT_COOLDOWNS.inc();
                    let cooldown = self.config.rate_limit_cooldown();
                    warn!(
                        title = %request.title,
                        error = %e,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Report creation rate limited, cooling down"
                    );
                    tokio::time::sleep(cooldown).await;
                } else {
                    metrics::CREATION_FAILURES.with_label_values(&["other"]).inc();
                    warn!(title = %request.title, error = %e, "Report creation failed");
                }
                None
            }
        }
    }

    /// Sweep the active jobs until each resolves or the batch deadline passes.
    async fn poll_until_resolved(
        &self,
        batch_no: usize,
        jobs: &mut [ReportJob],
        state: &mut RunState,
    ) {
        let started = Instant::now();
        let deadline = started + self.config.max_wait_per_batch();
        let mut sweeps = 0u32;

        'sweeps: loop {
            let active: Vec<usize> = (0..jobs.len())
                .filter(|&i| jobs[i].state.is_active())
                .collect();
            if active.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                for i in active {
                    let job = &mut jobs[i];
                    job.last_error = Some(
                        OrchestratorError::Timeout {
                            report_id: job.remote_report_id.clone(),
                        }
                        .to_string(),
                    );
                    self.advance(job, JobState::TimedOut);
                    warn!(report_id = %job.remote_report_id, "Report timed out");
                }
                break;
            }

            sweeps += 1;
            debug!(batch = batch_no, sweep = sweeps, active = active.len(), "Status sweep");

            for i in active {
                let job = &mut jobs[i];
                match self.service.check_status(&job.remote_report_id).await {
                    Ok(remote) => self.apply_remote_state(job, remote),
                    Err(e) if e.is_fatal() => {
                        error!(report_id = %job.remote_report_id, error = %e, "Authentication failed, stopping run");
                        state.halt_on(&e);
                        break 'sweeps;
                    }
                    Err(e) => {
                        metrics::STATUS_CHECK_ERRORS.inc();
                        warn!(
                            report_id = %job.remote_report_id,
                            error = %e,
                            "Status check failed, retrying next sweep"
                        );
                    }
                }
            }
            state.limiter.observe(self.service.last_observed_quota());

            if jobs.iter().any(|job| job.state.is_active()) {
                let now = Instant::now();
                if now < deadline {
                    tokio::time::sleep(self.config.status_poll_interval().min(deadline - now))
                        .await;
                }
            }
        }

        metrics::BATCH_POLL_DURATION
            .with_label_values(&[])
            .observe(started.elapsed().as_secs_f64());
    }

    fn apply_remote_state(&self, job: &mut ReportJob, remote: RemoteReportState) {
        let next = match remote {
            RemoteReportState::Running => JobState::Running,
            RemoteReportState::Finished => JobState::Finished,
            RemoteReportState::Error => JobState::Error,
            RemoteReportState::Cancelled => JobState::Cancelled,
        };
        if next == job.state {
            return;
        }

        if matches!(next, JobState::Error | JobState::Cancelled) {
            job.last_error = Some(
                OrchestratorError::RemoteJobFailed {
                    report_id: job.remote_report_id.clone(),
                    state: next,
                }
                .to_string(),
            );
        }
        self.advance(job, next);

        match next {
            JobState::Finished => info!(report_id = %job.remote_report_id, "Report finished"),
            JobState::Error | JobState::Cancelled => {
                warn!(report_id = %job.remote_report_id, state = %next, "Report failed remotely")
            }
            _ => debug!(report_id = %job.remote_report_id, state = %next, "Report state changed"),
        }
    }

    async fn download_finished(&self, jobs: &mut [ReportJob], state: &mut RunState) {
        for job in jobs.iter_mut().filter(|job| job.state == JobState::Finished) {
            if state.auth_halted() {
                break;
            }

            match self
                .service
                .download(&job.remote_report_id, &self.download_dir)
                .await
            {
                Ok(path) => {
                    info!(report_id = %job.remote_report_id, path = %path.display(), "Report downloaded");
                    job.file_path = Some(path);
                    self.advance(job, JobState::Downloaded);
                }
                Err(e) => {
                    if e.is_fatal() {
                        error!(report_id = %job.remote_report_id, error = %e, "Authentication failed, stopping run");
                        state.halt_on(&e);
                    }
                    job.last_error = Some(
                        OrchestratorError::DownloadFailure {
                            report_id: job.remote_report_id.clone(),
                            reason: e.to_string(),
                        }
                        .to_string(),
                    );
                    warn!(report_id = %job.remote_report_id, error = %e, "Report download failed");
                    self.advance(job, JobState::DownloadFailed);
                }
            }
        }
        state.limiter.observe(self.service.last_observed_quota());
    }

    /// Apply a transition and persist it. Invalid transitions are logged and ignored.
    fn advance(&self, job: &mut ReportJob, next: JobState) {
        if let Err(e) = job.transition(next) {
            warn!(error = %e, "Ignoring invalid report transition");
            return;
        }
        self.persist(job);
    }

    fn persist(&self, job: &ReportJob) {
        if let Err(e) = self.store.upsert(&ReportRecord::from_job(job)) {
            warn!(
                report_id = %job.remote_report_id,
                error = %e,
                "Failed to persist report record"
            );
        }
    }
}
