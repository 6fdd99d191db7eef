//! Command-line entry point.

use clap::Parser;
use planner_sync::services::{CycleOutcome, TenantRun};
use planner_sync::{AppConfig, AppError, SyncManager};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Keep Canvas planner items and a Notion task database in agreement.
#[derive(Debug, Parser)]
#[command(name = "planner-sync", version, about)]
struct Cli {
    /// TOML file listing tenants; without it a single tenant is read from the environment.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run one pass for every tenant and exit.
    #[arg(long)]
    once: bool,

    /// With --once, print the reports as JSON.
    #[arg(long, requires = "once")]
    json: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<AppConfig, AppError> {
    match &cli.config {
        Some(path) => AppConfig::load(path),
        None => AppConfig::from_env(),
    }
}

fn print_summary(runs: &[TenantRun]) {
    for run in runs {
        match &run.outcome {
            CycleOutcome::Synced(report) => println!(
                "{}: ok - {} matched, {} created, {} due dates, {} completed, {} overrides",
                run.tenant_id,
                report.matched,
                report.created,
                report.due_dates_updated,
                report.marked_complete,
                report.overrides_created + report.overrides_updated
            ),
            CycleOutcome::Failed(e) => println!("{}: failed - {}", run.tenant_id, e),
            CycleOutcome::Skipped => println!("{}: skipped", run.tenant_id),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let manager = SyncManager::new(&config);
    for tenant in config.tenants {
        // A misconfigured tenant is skipped; the others still run.
        if let Err(e) = manager.add_user(&tenant.id, tenant.config).await {
            tracing::error!(tenant = %tenant.id, "skipping tenant: {}", e);
        }
    }

    if manager.tenant_ids().await.is_empty() {
        tracing::error!("no usable tenants configured");
        return ExitCode::FAILURE;
    }

    if cli.once {
        let runs = manager.run_once().await;
        if cli.json {
            match serde_json::to_string_pretty(&runs) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    tracing::error!("failed to encode reports: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        } else {
            print_summary(&runs);
        }
        return if runs.iter().any(TenantRun::is_failure) {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    manager.start().await;
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {}", e);
    }
    tracing::info!("shutting down");
    manager.stop().await;
    ExitCode::SUCCESS
}
