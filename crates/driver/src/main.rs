//! lockwatch: static race and deadlock detection for callback-style drivers.
//!
//! Usage:
//!   lockwatch instrument drv.json --metadata drv.info --output out/
//!   lockwatch check drv.json --metadata drv.info --verifier /path/to/verifier

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use lockwatch_driver::cli::{Cli, Commands};
use lockwatch_driver::{Outcome, check, instrument};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();
    let result = match cli.command {
        Commands::Instrument { .. } => instrument(&config),
        Commands::Check { .. } => check(&config),
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            err.outcome()
        }
    };
    if outcome != Outcome::Done {
        tracing::debug!(?outcome, "Exiting with failure");
    }
    ExitCode::from(outcome.code())
}
