//! Command-line interface: `lockwatch instrument` and `lockwatch check`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lockwatch_analysis::StrategyKind;

use crate::config::{DriverConfig, OutputFormat, default_jobs, parse_pair};

#[derive(Parser, Debug)]
#[command(name = "lockwatch")]
#[command(about = "Lockset-based race and deadlock detection for callback-style drivers")]
#[command(version)]
pub struct Cli {
    /// Log at debug level and show per-pair timing
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instrument every entry point pair and write the pair checkers
    Instrument {
        #[command(flatten)]
        input: InputArgs,

        /// Directory for one instrumented program per pair (stdout when unset)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Instrument and verify every pair, then report races and deadlocks
    Check {
        #[command(flatten)]
        input: InputArgs,

        /// Verifier command
        #[arg(long, env = "LOCKWATCH_VERIFIER")]
        verifier: Option<PathBuf>,

        /// Extra argument passed to the verifier (repeatable)
        #[arg(long = "verifier-arg", allow_hyphen_values = true)]
        verifier_args: Vec<String>,

        /// Per-pair timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Upper bound on candidate elimination rounds per pair
        #[arg(long, default_value_t = 64)]
        max_houdini_rounds: usize,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Arguments shared by both subcommands.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Input program (JSON)
    pub program: PathBuf,

    /// Driver metadata (JSON or info format)
    #[arg(long, short)]
    pub metadata: PathBuf,

    /// Shadow-state encoding: watchdog | map
    #[arg(long, default_value = "watchdog")]
    pub strategy: StrategyKind,

    /// Do not generate candidate invariants
    #[arg(long)]
    pub no_summaries: bool,

    /// Do not attach error-reporting metadata
    #[arg(long)]
    pub no_error_reporting: bool,

    /// Only this pair, as `first,second`
    #[arg(long, value_parser = parse_pair)]
    pub pair: Option<(String, String)>,

    /// Parallel jobs (default: half the cores)
    #[arg(long, short, env = "LOCKWATCH_JOBS")]
    pub jobs: Option<usize>,
}

impl InputArgs {
    fn apply(&self, verbose: bool) -> DriverConfig {
        let mut config = DriverConfig::new(&self.program, &self.metadata);
        config.strategy = self.strategy;
        config.summaries = !self.no_summaries;
        config.error_reporting = !self.no_error_reporting;
        config.pair = self.pair.clone();
        config.jobs = self.jobs.unwrap_or_else(default_jobs);
        config.verbose = verbose;
        config
    }
}

impl Cli {
    /// Run configuration described by the arguments.
    pub fn config(&self) -> DriverConfig {
        match &self.command {
            Commands::Instrument { input, output } => {
                let mut config = input.apply(self.verbose);
                config.output_dir = output.clone();
                config
            }
            Commands::Check {
                input,
                verifier,
                verifier_args,
                timeout,
                max_houdini_rounds,
                format,
            } => {
                let mut config = input.apply(self.verbose);
                config.verifier = verifier.clone();
                config.verifier_args = verifier_args.clone();
                config.timeout_ms = timeout.saturating_mul(1000);
                config.max_houdini_rounds = *max_houdini_rounds;
                config.format = *format;
                config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_instrument() {
        let cli = Cli::try_parse_from([
            "lockwatch",
            "instrument",
            "drv.json",
            "--metadata",
            "drv.info",
            "--strategy",
            "map",
            "--output",
            "out",
        ])
        .unwrap();
        let config = cli.config();
        assert_eq!(config.program_path, PathBuf::from("drv.json"));
        assert_eq!(config.strategy, StrategyKind::Map);
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
        assert!(config.summaries);
    }

    #[test]
    fn parses_check() {
        let cli = Cli::try_parse_from([
            "lockwatch",
            "-v",
            "check",
            "drv.json",
            "-m",
            "drv.info",
            "--verifier",
            "/opt/verify",
            "--timeout",
            "5",
            "--pair",
            "open,close",
            "--format",
            "json",
            "--no-summaries",
            "--jobs",
            "3",
        ])
        .unwrap();
        let config = cli.config();
        assert!(config.verbose);
        assert_eq!(config.verifier, Some(PathBuf::from("/opt/verify")));
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.pair, Some(("open".into(), "close".into())));
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.summaries);
        assert_eq!(config.jobs, 3);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let result = Cli::try_parse_from([
            "lockwatch", "instrument", "drv.json", "-m", "drv.info", "--strategy", "bogus",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_pair() {
        let result = Cli::try_parse_from([
            "lockwatch", "check", "drv.json", "-m", "drv.info", "--pair", "open",
        ]);
        assert!(result.is_err());
    }
}
