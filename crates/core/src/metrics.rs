//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (creations, terminal outcomes, batches)
//! - Slot admission (wait durations)
//! - Remote service (status check errors, observed quota)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Orchestrator - Creation Metrics
// =============================================================================

/// Reports accepted by the remote service, by kind.
pub static REPORTS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scanreports_reports_created_total",
            "Total reports created on the remote service",
        ),
        &["kind"], // "scan", "host"
    )
    .unwrap()
});

/// Report creations that failed, by reason.
pub static CREATION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scanreports_creation_failures_total",
            "Total report creations that failed",
        ),
        &["reason"], // "rate_limited", "authentication", "other"
    )
    .unwrap()
});

// =============================================================================
// Orchestrator - Outcome Metrics
// =============================================================================

/// Final outcomes per request.
pub static REPORT_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scanreports_report_outcomes_total",
            "Final outcome of each report request",
        ),
        &["outcome"],
    )
    .unwrap()
});

/// Batches processed.
pub static BATCHES_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scanreports_batches_processed_total",
        "Total batches processed",
    )
    .unwrap()
});

/// Wall-clock time spent polling a batch until every report resolved.
pub static BATCH_POLL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "scanreports_batch_poll_duration_seconds",
            "Duration of the polling phase of a batch",
        )
        .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Slot Admission Metrics
// =============================================================================

/// Time spent waiting for report slots.
pub static SLOT_WAIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "scanreports_slot_wait_duration_seconds",
            "Time spent waiting for free report slots",
        )
        .buckets(vec![0.1, 1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0]),
        &["result"], // "acquired", "timed_out"
    )
    .unwrap()
});

/// Running-count queries that failed and fell back to the configured maximum.
pub static SLOT_QUERY_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scanreports_slot_query_fallbacks_total",
        "Running report count queries that failed open",
    )
    .unwrap()
});

// =============================================================================
// Remote Service Metrics
// =============================================================================

/// Status checks that failed and were retried at the next sweep.
pub static STATUS_CHECK_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scanreports_status_check_errors_total",
        "Failed report status checks",
    )
    .unwrap()
});

/// Remaining request quota as last observed.
pub static QUOTA_REMAINING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scanreports_quota_remaining",
        "Remaining request quota last observed from the service",
    )
    .unwrap()
});

/// Cooldowns taken after the service refused a creation for quota reasons.
pub static RATE_LIMIT_COOLDOWNS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scanreports_rate_limit_cooldowns_total",
        "Cooldowns taken after rate limited creations",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Creation
        Box::new(REPORTS_CREATED.clone()),
        Box::new(CREATION_FAILURES.clone()),
        // Outcomes
        Box::new(REPORT_OUTCOMES.clone()),
        Box::new(BATCHES_PROCESSED.clone()),
        Box::new(BATCH_POLL_DURATION.clone()),
        // Slots
        Box::new(SLOT_WAIT_DURATION.clone()),
        Box::new(SLOT_QUERY_FALLBACKS.clone()),
        // Remote service
        Box::new(STATUS_CHECK_ERRORS.clone()),
        Box::new(QUOTA_REMAINING.clone()),
        Box::new(RATE_LIMIT_COOLDOWNS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        REPORTS_CREATED.with_label_values(&["scan"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"scanreports_reports_created_total".to_string()));
    }
}
