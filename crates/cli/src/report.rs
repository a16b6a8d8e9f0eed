//! Human-readable output for command results.

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use scanreports_core::{
    metrics, ApiStatus, HaltReason, ReportKind, RunLogEntry, RunReport, RunSummary, StatusCounts,
};

/// Print one line per request, then the counts.
pub fn print_run_report(report: &RunReport) {
    println!();
    for outcome in &report.outcomes {
        let target = match &outcome.request.kind {
            ReportKind::Scan { source_ref } => format!("scan {}", source_ref),
            ReportKind::Host => "host".to_string(),
        };
        let detail = match (&outcome.file_path, &outcome.error) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{:<16} {} [{} / template {}] {} {}",
            outcome.status,
            outcome.request.title,
            target,
            outcome.request.template_id,
            outcome.report_id.as_deref().unwrap_or("-"),
            detail
        );
    }

    let summary = report.summary();
    println!();
    println!(
        "{} requests in {} batch(es): {} succeeded, {} failed, {} not attempted",
        summary.total, report.batches, summary.succeeded, summary.failed, summary.not_attempted
    );
    if let Some(reason) = &report.halted {
        println!("Run halted: {}", halt_message(reason));
    }
}

fn halt_message(reason: &HaltReason) -> String {
    match reason {
        HaltReason::QuotaExhausted { remaining } => {
            format!("request quota exhausted ({} remaining)", remaining)
        }
        HaltReason::AuthenticationFailed { message } => message.clone(),
    }
}

fn run_status(report: &RunReport, summary: &RunSummary) -> &'static str {
    if report.halted.is_some() {
        "halted"
    } else if summary.succeeded == summary.total {
        "success"
    } else if summary.succeeded > 0 {
        "partial"
    } else {
        "failed"
    }
}

/// Run log entry describing `report`.
pub fn run_log_entry(operation: &str, report: &RunReport) -> RunLogEntry {
    let summary = report.summary();
    let mut details = format!(
        "run {}: {} requests in {} batch(es), {} failed, {} not attempted",
        report.run_id, summary.total, report.batches, summary.failed, summary.not_attempted
    );
    if let Some(reason) = &report.halted {
        details.push_str(&format!("; halted: {}", halt_message(reason)));
    }

    RunLogEntry {
        operation: operation.to_string(),
        status: run_status(report, &summary).to_string(),
        details: Some(details),
        records_processed: summary.succeeded as u32,
        started_at: report.started_at,
        finished_at: report.finished_at,
    }
}

pub fn print_status(status: &ApiStatus) {
    match status.quota.remaining {
        Some(remaining) => println!("Requests remaining: {}", remaining),
        None => println!("Requests remaining: unknown"),
    }
    if let Some(reset_at) = status.quota.reset_at {
        println!("Quota resets at:    {}", reset_at.to_rfc3339());
    }
    println!(
        "Running reports:    {}/{} ({} slots free)",
        status.running, status.max_slots, status.available_slots
    );
    for report in &status.running_reports {
        println!("  {} {}", report.id, report.title);
    }
}

pub fn print_stats(counts: &StatusCounts, runs: &[RunLogEntry]) {
    let total: u64 = counts.values().sum();
    println!("Stored reports: {}", total);
    for (status, count) in counts {
        println!("  {:<16} {}", status.as_str(), count);
    }

    if !runs.is_empty() {
        println!();
        println!("Recent runs:");
        for run in runs {
            println!(
                "  {} {:<14} {:<8} {} {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.operation,
                run.status,
                run.records_processed,
                run.details.as_deref().unwrap_or("")
            );
        }
    }
}

/// Print the core metrics in the Prometheus text format.
pub fn print_metrics() -> Result<()> {
    let registry = Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metric")?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    print!("{}", String::from_utf8_lossy(&buffer));
    Ok(())
}
