//! OenoFlow model evaluation stage.
//!
//! Loads the pipeline configuration, runs the evaluator once and reports the
//! outcome. Runs with no arguments from the project root.

mod settings;

use anyhow::Context;
use clap::Parser;
use oenoflow_eval::{Evaluator, MetricSet};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const STAGE_NAME: &str = "Model evaluation stage";

/// Score the trained model on the test split and log the run to MLflow
#[derive(Parser, Debug)]
#[command(name = "oenoflow-eval-stage", version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Model hyper-parameters file
    #[arg(long, default_value = "params.toml")]
    params: PathBuf,

    /// Data schema file
    #[arg(long, default_value = "schema.toml")]
    schema: PathBuf,

    /// Directory for the JSON run log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors to stderr
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (MLFLOW_TRACKING_* credentials)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(&cli);

    tracing::info!(">>>>>> stage {STAGE_NAME} started <<<<<<");
    match run(&cli).await {
        Ok(metrics) => {
            tracing::info!(
                rmse = metrics.rmse,
                mae = metrics.mae,
                r2 = metrics.r2,
                ">>>>>> stage {STAGE_NAME} completed <<<<<<\n\nx==========x"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(stage = STAGE_NAME, "Stage failed: {e:#}");
            Err(e)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<MetricSet> {
    let settings = settings::load_settings(&cli.config, &cli.params, &cli.schema)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .prepare_root_dir()
        .context("creating stage root directory")?;

    let config = settings.into_evaluation_config(settings::credentials_from_env());
    tracing::debug!(?config, "Evaluation config");

    let evaluator = Evaluator::new(config).context("building evaluator")?;
    evaluator.evaluate().await.map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("{STAGE_NAME} failed ({kind:?} error)"))
    })
}

/// Human-readable stderr output plus a JSON log file under `cli.log_dir`.
fn init_tracing(cli: &Cli) -> WorkerGuard {
    let level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(stderr_filter);

    let (writer, guard) = tracing_appender::non_blocking(file_appender(&cli.log_dir));
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

fn file_appender(log_dir: &Path) -> tracing_appender::rolling::RollingFileAppender {
    let _ = std::fs::create_dir_all(log_dir);
    tracing_appender::rolling::never(log_dir, "running_logs.log")
}
