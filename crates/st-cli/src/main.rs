mod cli;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use st_optimizer::{JsonFileReporter, ResultReporter, Study};

use crate::cli::Args;

/// How a run ended, as seen by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Success,
    /// The external program was not found; no trial ran.
    MissingTarget,
    /// Every trial failed.
    Degenerate,
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => ExitCode::SUCCESS,
            RunStatus::MissingTarget => ExitCode::FAILURE,
            RunStatus::Degenerate => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let status = run(Args::parse()).await?;
    Ok(status.into())
}

async fn run(args: Args) -> anyhow::Result<RunStatus> {
    let target = match args.resolve_target() {
        Ok(target) => target,
        Err(e) => {
            error!("{e}");
            return Ok(RunStatus::MissingTarget);
        }
    };
    let command = args.command(target);
    info!(command = %command, "Using external optimizer");

    let study = Study::external(args.study_config(), command)
        .context("Invalid study configuration")?;

    let cancel = study.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current trial");
            cancel.cancel();
        }
    });

    let outcome = study.run().await.context("Study produced no trials")?;
    let result = &outcome.result;

    println!(
        "Best hyperparameters: {}",
        serde_json::to_string(&result.best_params)?
    );

    // A failed write is reported but does not change the outcome.
    let reporter = JsonFileReporter::new(&args.output);
    match reporter.report(result) {
        Ok(()) => println!("Saved best results to {}", reporter.path().display()),
        Err(e) => error!("{e}"),
    }

    if let Err(e) = result.ensure_valid() {
        println!("No valid result: {e}");
        return Ok(RunStatus::Degenerate);
    }

    println!(
        "Best value: {} (trial {})",
        result.best_value, result.best_trial_number
    );
    Ok(RunStatus::Success)
}
