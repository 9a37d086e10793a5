mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};
use vidharvest::app::{self, EXIT_FAILURE};
use vidharvest::config::Config;
use vidharvest::pipeline::Pipeline;
use vidharvest::scheduler::{Scheduler, shutdown_signal};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter_handle = init_tracing();

    let config = match Config::load(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vidharvest: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    if let Some(handle) = filter_handle {
        apply_log_filter(&handle, &config.telemetry.log_filter);
    }

    match cli.command {
        Commands::Run(args) => run(&config, args).await,
        Commands::Serve => serve(&config).await,
        Commands::Queues => queues(&config),
        Commands::Config => print_config(&config),
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// RUST_LOG wins over the configured filter
///
/// Without RUST_LOG, logging starts at `info` so configuration loading is
/// visible, and the handle swaps in the configured filter afterwards.
fn init_tracing() -> Option<FilterHandle> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    Some(handle)
}

fn apply_log_filter(handle: &FilterHandle, directives: &str) {
    let filter = match EnvFilter::try_new(directives) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(directives, error = %e, "Invalid log filter, keeping info");
            return;
        }
    };

    if let Err(e) = handle.reload(filter) {
        tracing::warn!(error = %e, "Failed to apply log filter");
    }
}

fn bootstrap(config: &Config) -> Result<Arc<Pipeline>, ExitCode> {
    app::bootstrap(config).map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        ExitCode::from(e.exit_code())
    })
}

async fn run(config: &Config, args: RunArgs) -> ExitCode {
    let pipeline = match bootstrap(config) {
        Ok(pipeline) => pipeline,
        Err(code) => return code,
    };

    let threshold = args
        .threshold_minutes
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)));

    let summary = pipeline.run_stages(&args.stages, threshold).await;
    for (stage, result) in &summary.results {
        match result {
            Ok(outcome) => tracing::info!(%stage, ?outcome, "Stage finished"),
            Err(e) => tracing::error!(%stage, error = %e, "Stage failed"),
        }
    }

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}

async fn serve(config: &Config) -> ExitCode {
    let pipeline = match bootstrap(config) {
        Ok(pipeline) => pipeline,
        Err(code) => return code,
    };

    Scheduler::new(pipeline.clone(), &config.schedule)
        .run(shutdown_signal())
        .await;

    if let Err(e) = pipeline.persist() {
        tracing::error!(error = %e, "Failed to flush stores");
        return ExitCode::from(EXIT_FAILURE);
    }
    ExitCode::SUCCESS
}

fn queues(config: &Config) -> ExitCode {
    let queue = match app::open_queue(config) {
        Ok(queue) => queue,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::from(e.exit_code());
        }
    };

    match queue.stats() {
        Ok(stats) => {
            for (kind, pending) in &stats.pending {
                println!("{:<26} {:>8} pending", kind.as_str(), pending);
            }
            println!("{:<26} {:>8}", "archived", stats.archived);
            println!("{:<26} {:>8}", "dead-lettered", stats.dead_lettered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read queue stats");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn print_config(config: &Config) -> ExitCode {
    match toml::to_string_pretty(config) {
        Ok(rendered) => {
            print!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("vidharvest: cannot render configuration: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
