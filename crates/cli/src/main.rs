mod cli;
mod prompt;
mod report;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanreports_core::{
    host_report_requests, load_config, scan_report_requests, select_templates, validate_config,
    AlwaysContinue, Config, QualysClient, QuotaConfirmation, RemoteReportService,
    ReportOrchestrator, ReportRecordStore, ReportRequest, SanitizedConfig, SqliteReportStore,
};

use cli::{Cli, Command};
use prompt::PromptConfirmation;

/// Exit code when a run halted or a wait timed out.
const EXIT_INCOMPLETE: i32 = 2;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_INCOMPLETE),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but did not complete.
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    info!("Loading configuration from {:?}", cli.config);
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    cli.apply_overrides(&mut config);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    let completed = match cli.command {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&sanitized)?);
            true
        }
        Command::Stats { runs } => {
            let store = open_store(&config)?;
            let counts = store
                .status_counts()
                .context("Failed to read report statistics")?;
            let recent = store
                .recent_runs(runs)
                .context("Failed to read run log")?;
            report::print_stats(&counts, &recent);
            true
        }
        Command::Status => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?, cli.yes)?;
            let status = orchestrator
                .api_status()
                .await
                .context("Failed to query API status")?;
            report::print_status(&status);
            true
        }
        Command::WaitSlots { required } => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?, cli.yes)?;
            let acquired = orchestrator.wait_for_slots(required).await;
            if acquired {
                println!("{} slot(s) available", required);
            } else {
                println!("Timed out waiting for {} slot(s)", required);
            }
            acquired
        }
        Command::Scans { scans } => {
            let requests = scan_report_requests(&scans, &config.templates.scan)?;
            info!(
                scans = scans.len(),
                templates = config.templates.scan.len(),
                requests = requests.len(),
                "Generating scan-based reports"
            );
            run_reports(&config, cli.yes, "scan_reports", requests).await?
        }
        Command::Templates { templates } => {
            let selected = select_templates(&config.templates.host, &templates)?;
            let requests = host_report_requests(&selected)?;
            info!(requests = requests.len(), "Generating host-based reports");
            run_reports(&config, cli.yes, "host_reports", requests).await?
        }
    };

    if cli.print_metrics {
        report::print_metrics()?;
    }

    Ok(completed)
}

fn open_store(config: &Config) -> Result<Arc<dyn ReportRecordStore>> {
    let store = SqliteReportStore::new(&config.database.path)
        .context("Failed to open report record store")?;
    info!("Report record store initialized");
    Ok(Arc::new(store))
}

fn build_orchestrator(
    config: &Config,
    store: Arc<dyn ReportRecordStore>,
    assume_yes: bool,
) -> Result<ReportOrchestrator> {
    let service: Arc<dyn RemoteReportService> = Arc::new(
        QualysClient::new(config.api.clone()).context("Failed to create report API client")?,
    );
    info!("Using report service: {}", service.name());

    let confirmation: Arc<dyn QuotaConfirmation> = if assume_yes {
        Arc::new(AlwaysContinue)
    } else {
        Arc::new(PromptConfirmation)
    };

    Ok(ReportOrchestrator::new(
        config.orchestrator.clone(),
        service,
        store,
        confirmation,
        &config.reports.download_path,
    ))
}

async fn run_reports(
    config: &Config,
    assume_yes: bool,
    operation: &str,
    requests: Vec<ReportRequest>,
) -> Result<bool> {
    let store = open_store(config)?;
    let orchestrator = build_orchestrator(config, Arc::clone(&store), assume_yes)?;
    info!(
        "Downloading reports to {:?}",
        orchestrator.download_dir()
    );

    let run = orchestrator.run(requests).await;
    report::print_run_report(&run);

    if let Err(e) = store.record_run(&report::run_log_entry(operation, &run)) {
        warn!(error = %e, "Failed to record run log entry");
    }

    if let Some(e) = run.error() {
        error!("Run stopped early: {}", e);
        return Ok(false);
    }
    Ok(true)
}
