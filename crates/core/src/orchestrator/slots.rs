//! Report slot accounting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::remote::{RemoteReportService, RunningReport};

/// Answers how many more reports can be started on the service right now.
///
/// Nothing is cached: every answer comes from a fresh running-count query.
pub struct SlotTracker {
    service: Arc<dyn RemoteReportService>,
    max_slots: usize,
    preview_limit: usize,
}

impl SlotTracker {
    pub fn new(service: Arc<dyn RemoteReportService>, max_slots: usize, preview_limit: usize) -> Self {
        Self {
            service,
            max_slots,
            preview_limit,
        }
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Free slots: maximum minus reports currently running.
    ///
    /// If the running count cannot be queried, fails open to the maximum.
    pub async fn available_slots(&self) -> usize {
        match self.service.count_running_jobs().await {
            Ok(running) => self.max_slots.saturating_sub(running),
            Err(e) => {
                metrics::SLOT_QUERY_FALLBACKS.inc();
                warn!(
                    service = self.service.name(),
                    error = %e,
                    max_slots = self.max_slots,
                    "Failed to count running reports, assuming all slots free"
                );
                self.max_slots
            }
        }
    }

    /// Up to the preview limit of reports currently running.
    pub async fn running_preview(&self) -> Vec<RunningReport> {
        match self.service.list_running_reports(self.preview_limit).await {
            Ok(mut reports) => {
                reports.truncate(self.preview_limit);
                reports
            }
            Err(e) => {
                debug!(error = %e, "Failed to list running reports");
                Vec::new()
            }
        }
    }

    /// Wait until `required` slots are free.
    ///
    /// Re-queries every `poll_interval`. Returns `false` once `max_wait` has
    /// elapsed without enough free slots, or right away if `required` exceeds
    /// the maximum.
    pub async fn await_slots(&self, required: usize, max_wait: Duration, poll_interval: Duration) -> bool {
        if required > self.max_slots {
            warn!(
                required,
                max_slots = self.max_slots,
                "Requested more slots than the service allows"
            );
            return false;
        }

        let started = Instant::now();
        let deadline = started + max_wait;
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let mut first_iteration = true;

        loop {
            let available = self.available_slots().await;
            if available >= required {
                debug!(required, available, "Report slots available");
                metrics::SLOT_WAIT_DURATION
                    .with_label_values(&["acquired"])
                    .observe(started.elapsed().as_secs_f64());
                return true;
            }

            if first_iteration {
                first_iteration = false;
                let running = self.running_preview().await;
                if !running.is_empty() {
                    let preview = running
                        .iter()
                        .map(|r| format!("{} ({})", r.title, r.id))
                        .collect::<Vec<_>>()
                        .join(", ");
                    info!(count = running.len(), "Reports running: {}", preview);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    required,
                    available,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Timed out waiting for report slots"
                );
                metrics::SLOT_WAIT_DURATION
                    .with_label_values(&["timed_out"])
                    .observe(started.elapsed().as_secs_f64());
                return false;
            }

            info!(
                required,
                available,
                "Waiting for report slots"
            );
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::testing::MockReportService;

    fn tracker(service: &Arc<MockReportService>, max_slots: usize) -> SlotTracker {
        SlotTracker::new(service.clone(), max_slots, 5)
    }

    #[tokio::test]
    async fn test_available_slots() {
        let service = Arc::new(MockReportService::new());
        service.set_running_count(3).await;
        assert_eq!(tracker(&service, 8).available_slots().await, 5);

        service.set_running_count(8).await;
        assert_eq!(tracker(&service, 8).available_slots().await, 0);

        service.set_running_count(11).await;
        assert_eq!(tracker(&service, 8).available_slots().await, 0);
    }

    #[tokio::test]
    async fn test_available_slots_fails_open() {
        let service = Arc::new(MockReportService::new());
        service
            .script_running_counts(vec![Err(RemoteError::Transport("reset".to_string()))])
            .await;
        assert_eq!(tracker(&service, 8).available_slots().await, 8);
    }

    #[tokio::test]
    async fn test_await_slots_immediate() {
        let service = Arc::new(MockReportService::new());
        service.set_running_count(4).await;
        let acquired = tracker(&service, 8)
            .await_slots(4, Duration::from_millis(100), Duration::from_millis(10))
            .await;
        assert!(acquired);
        assert_eq!(service.running_count_queries().await, 1);
    }

    #[tokio::test]
    async fn test_await_slots_frees_up() {
        let service = Arc::new(MockReportService::new());
        service.script_running_counts(vec![Ok(8), Ok(8), Ok(7)]).await;
        service.set_running_count(7).await;

        let acquired = tracker(&service, 8)
            .await_slots(1, Duration::from_secs(5), Duration::from_millis(10))
            .await;
        assert!(acquired);
        assert_eq!(service.running_count_queries().await, 3);
    }

    #[tokio::test]
    async fn test_await_slots_times_out() {
        let service = Arc::new(MockReportService::new());
        service.set_running_count(8).await;

        let started = Instant::now();
        let acquired = tracker(&service, 8)
            .await_slots(1, Duration::from_millis(100), Duration::from_millis(20))
            .await;
        let elapsed = started.elapsed();

        assert!(!acquired);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_await_slots_previews_running_once() {
        let service = Arc::new(MockReportService::new());
        service.set_running_count(8).await;
        service
            .set_running_reports(vec![RunningReport {
                id: "77".to_string(),
                title: "Busy".to_string(),
            }])
            .await;

        tracker(&service, 8)
            .await_slots(1, Duration::from_millis(60), Duration::from_millis(10))
            .await;
        assert_eq!(service.running_list_queries().await, 1);
    }

    #[tokio::test]
    async fn test_await_slots_more_than_max() {
        let service = Arc::new(MockReportService::new());
        let acquired = tracker(&service, 2)
            .await_slots(3, Duration::from_secs(60), Duration::from_secs(1))
            .await;
        assert!(!acquired);
        assert_eq!(service.running_count_queries().await, 0);
    }
}
