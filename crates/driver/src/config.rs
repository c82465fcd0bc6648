//! Settings of one driver run, independent of how they were supplied.

use std::path::PathBuf;

use lockwatch_analysis::{AnalysisOptions, StrategyKind};
use lockwatch_verifier::{VerifierConfig, VerifierError};

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Input program (JSON).
    pub program_path: PathBuf,
    /// Driver metadata (JSON or info format).
    pub metadata_path: PathBuf,
    pub strategy: StrategyKind,
    pub summaries: bool,
    pub error_reporting: bool,
    /// Directory receiving one instrumented program per pair.
    pub output_dir: Option<PathBuf>,
    pub format: OutputFormat,
    pub jobs: usize,
    /// Per-pair verifier timeout.
    pub timeout_ms: u64,
    /// Verifier command; auto-detected when unset.
    pub verifier: Option<PathBuf>,
    pub verifier_args: Vec<String>,
    /// Upper bound on candidate elimination rounds per pair.
    pub max_houdini_rounds: usize,
    /// Check only this pair, bypassing the pairing rules.
    pub pair: Option<(String, String)>,
    pub verbose: bool,
}

impl DriverConfig {
    pub fn new(program_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            program_path: program_path.into(),
            metadata_path: metadata_path.into(),
            strategy: StrategyKind::default(),
            summaries: true,
            error_reporting: true,
            output_dir: None,
            format: OutputFormat::Text,
            jobs: default_jobs(),
            timeout_ms: 60_000,
            verifier: None,
            verifier_args: Vec::new(),
            max_houdini_rounds: 64,
            pair: None,
            verbose: false,
        }
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions::default()
            .with_strategy(self.strategy)
            .with_summaries(self.summaries)
            .with_error_reporting(self.error_reporting)
    }

    /// Verifier settings; falls back to auto-detection when no command is set.
    pub fn verifier_config(&self) -> Result<VerifierConfig, VerifierError> {
        let config = match &self.verifier {
            Some(path) => VerifierConfig::new(path.clone()),
            None => VerifierConfig::auto_detect()?,
        };
        Ok(config
            .with_timeout(self.timeout_ms)
            .with_extra_args(self.verifier_args.clone()))
    }
}

/// Half the available cores, at least one.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

/// Parse `a,b` into a pair of entry point names.
pub fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (first, second) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'first,second', got '{s}'"))?;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() {
        return Err(format!("expected 'first,second', got '{s}'"));
    }
    Ok((first.to_string(), second.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DriverConfig::new("drv.json", "drv.info");
        assert_eq!(config.strategy, StrategyKind::Watchdog);
        assert!(config.summaries);
        assert!(config.error_reporting);
        assert!(config.jobs >= 1);
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[test]
    fn analysis_options_follow_config() {
        let mut config = DriverConfig::new("drv.json", "drv.info");
        config.strategy = StrategyKind::Map;
        config.summaries = false;
        let options = config.analysis_options();
        assert_eq!(options.strategy, StrategyKind::Map);
        assert!(!options.summaries);
        assert!(options.error_reporting);
    }

    #[test]
    fn explicit_verifier_gets_timeout() {
        let mut config = DriverConfig::new("drv.json", "drv.info");
        config.verifier = Some(PathBuf::from("/opt/verify"));
        config.timeout_ms = 5_000;
        let verifier = config.verifier_config().unwrap();
        assert_eq!(verifier.verifier_path, PathBuf::from("/opt/verify"));
        assert_eq!(verifier.timeout_ms, 5_000);
    }

    #[test]
    fn pair_parsing() {
        assert_eq!(parse_pair("open, close").unwrap(), ("open".into(), "close".into()));
        assert!(parse_pair("open").is_err());
        assert!(parse_pair(",close").is_err());
    }
}
