use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stocklens::batch::results::ResultsDocument;
use stocklens::batch::store::ScreenshotDir;
use stocklens::batch::{BatchRunner, load_stocks, target_stock};
use stocklens::bootstrap;
use stocklens::config::Config;
use stocklens::credentials::EnvCredentials;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stocklens=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let config_path = std::env::var_os("STOCKLENS_CONFIG").map(PathBuf::from);
    let config =
        Config::load_or_default(config_path.as_deref()).context("loading configuration")?;

    let mut orchestrator = bootstrap::build_orchestrator(&config, &EnvCredentials)?;
    bootstrap::log_provider_status(orchestrator.registry());

    let stocks = match target_stock(|key| std::env::var(key).ok()) {
        Some(stock) => {
            info!(stock = %stock.label(), "single-stock mode");
            vec![stock]
        }
        None => load_stocks(&config.run.stocks_path).context("loading stock list")?,
    };

    let store = ScreenshotDir::new(&config.run.screenshots_dir);
    let report = BatchRunner::new(
        &mut orchestrator,
        &store,
        config.run.pipeline,
        config.run.request_delay,
    )
    .run(&stocks)
    .await;

    for skipped in &report.skipped {
        warn!(code = %skipped.code, name = %skipped.name, "not analyzed: {}", skipped.reason);
    }

    // Keep the previous results in place when nothing succeeded.
    if report.attempted() > 0 && report.records.is_empty() {
        error!(attempted = report.attempted(), "no stock could be analyzed");
        return Ok(ExitCode::FAILURE);
    }

    let succeeded = report.records.len();
    let document = ResultsDocument::new(report.records, &orchestrator);
    document
        .write(&config.run.results_path)
        .with_context(|| format!("writing {}", config.run.results_path.display()))?;
    if let Some(mirror) = &config.run.mirror_results_path {
        document
            .write(mirror)
            .with_context(|| format!("writing {}", mirror.display()))?;
    }

    info!(
        succeeded,
        skipped = report.skipped.len(),
        provider = %document.provider,
        run_id = %document.run_id,
        "results saved to {}",
        config.run.results_path.display()
    );
    Ok(ExitCode::SUCCESS)
}
