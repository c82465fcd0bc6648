//! lockwatch driver library.
//!
//! Ties the analysis and the verifier together: loads a driver program and
//! its metadata, instruments each entry point pair, checks the pair checkers
//! in parallel, interprets counterexamples and reports.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod json_output;
pub mod output;
pub mod parallel;
pub mod report;
pub mod run;
pub mod stats;

use lockwatch_verifier::ProcessBackend;

pub use config::{DriverConfig, OutputFormat};
pub use error::{DriverError, Outcome};
pub use report::{ErrorReport, interpret};
pub use run::{PairOutcome, PairVerdict};
pub use stats::RunStatistics;

/// `lockwatch instrument`: write the instrumented program of every pair.
pub fn instrument(config: &DriverConfig) -> Result<Outcome, DriverError> {
    let analysis = run::load_analysis(config)?;
    let pairs = run::select_pairs(&analysis, config)?;
    let programs = parallel::instrument_pairs_parallel(&analysis, &pairs, config.jobs)?;

    match &config.output_dir {
        Some(dir) => {
            let written = run::write_programs(dir, &programs)?;
            tracing::info!(files = written.len(), dir = %dir.display(), "Wrote pair checkers");
        }
        None => {
            for instrumented in &programs {
                println!("// pair {}", instrumented.pair);
                println!("{}", instrumented.program);
            }
        }
    }
    Ok(Outcome::Done)
}

/// `lockwatch check`: instrument and verify every pair, then report.
pub fn check(config: &DriverConfig) -> Result<Outcome, DriverError> {
    let analysis = run::load_analysis(config)?;
    let pairs = run::select_pairs(&analysis, config)?;
    let backend = ProcessBackend::new(config.verifier_config()?);

    if config.format == OutputFormat::Text {
        output::print_header(&config.program_path.display().to_string(), pairs.len());
    }
    let outcomes = parallel::check_pairs_parallel(
        &analysis,
        &pairs,
        &backend,
        config.jobs,
        config.max_houdini_rounds,
    )?;
    let stats = RunStatistics::from_outcomes(&outcomes);

    match config.format {
        OutputFormat::Text => output::print_outcomes(&outcomes, &stats, config.verbose),
        OutputFormat::Json => json_output::print_json_report(&json_output::JsonRunReport::new(
            &config.program_path.display().to_string(),
            &outcomes,
        )),
    }
    Ok(stats.outcome())
}
