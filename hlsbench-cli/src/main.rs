mod cli;
mod duration;
mod error;

use crate::{cli::Args, error::AppError};
use clap::Parser;
use hlsbench_engine::Benchmark;
use std::process;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet, args.json);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let config = args.to_config();
    info!(
        url = %args.url,
        budget = ?config.recording_budget,
        scratch_file = config.scratch_file,
        user_agent = %config.user_agent,
        "Starting hlsbench"
    );

    let benchmark = Benchmark::new(config)?;
    let summary = benchmark.run(&args.url).await?;
    summary.log_summary();
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_target(false))
            .init();
    } else {
        subscriber.with(fmt::layer().with_target(false)).init();
    }
}
