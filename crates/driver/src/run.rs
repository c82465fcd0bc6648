//! Orchestration of a driver run: load inputs, choose pairs, instrument and
//! check each pair, summarize.

use std::path::Path;
use std::time::Instant;

use lockwatch_analysis::{DriverAnalysis, DriverMetadata, EntryPointPair, PairProgram};
use lockwatch_ir::Program;
use lockwatch_verifier::{
    VerifierBackend, VerifierResult, apply_candidates, eliminate_candidates_bounded,
};

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::report::{CaptureIndex, ErrorReport, interpret};

/// Verdict on one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairVerdict {
    Proved,
    Disproved(Vec<ErrorReport>),
    Inconclusive(String),
    ResourceExhausted(String),
    /// The verifier could not be run for this pair.
    Failed(String),
}

impl PairVerdict {
    pub fn reports(&self) -> &[ErrorReport] {
        match self {
            PairVerdict::Disproved(reports) => reports,
            _ => &[],
        }
    }
}

/// Result of checking one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub pair: EntryPointPair,
    pub checker: String,
    pub verdict: PairVerdict,
    pub candidates_proved: usize,
    pub candidates_refuted: usize,
    pub duration_ms: u64,
}

fn read_file(path: &Path) -> Result<String, DriverError> {
    std::fs::read_to_string(path).map_err(|e| DriverError::io(path, e))
}

/// Read the program and metadata named by `config` and bind them.
pub fn load_analysis(config: &DriverConfig) -> Result<DriverAnalysis, DriverError> {
    let program = Program::from_json(&read_file(&config.program_path)?)?;
    let metadata = DriverMetadata::parse(&read_file(&config.metadata_path)?)?;
    tracing::info!(
        program = %config.program_path.display(),
        procedures = program.procedures.len(),
        modules = metadata.modules.len(),
        "Loaded driver"
    );
    Ok(DriverAnalysis::new(program, &metadata, config.analysis_options())?)
}

/// The explicitly requested pair, or every pair the host can run concurrently.
pub fn select_pairs(
    analysis: &DriverAnalysis,
    config: &DriverConfig,
) -> Result<Vec<EntryPointPair>, DriverError> {
    match &config.pair {
        Some((first, second)) => Ok(vec![analysis.explicit_pair(first, second)?]),
        None => {
            let pairs = analysis.pairs();
            tracing::info!(pairs = pairs.len(), "Enumerated entry point pairs");
            Ok(pairs)
        }
    }
}

/// Instrument `pair`, eliminate its candidates and verify the checker.
///
/// Instrumentation errors abort the run. Verifier failures only mark this
/// pair as failed.
pub fn check_pair(
    analysis: &DriverAnalysis,
    pair: &EntryPointPair,
    backend: &dyn VerifierBackend,
    max_rounds: usize,
) -> Result<PairOutcome, DriverError> {
    let start = Instant::now();
    let instrumented = analysis.instrument(pair)?;
    let mut outcome = PairOutcome {
        pair: pair.clone(),
        checker: instrumented.checker.clone(),
        verdict: PairVerdict::Proved,
        candidates_proved: 0,
        candidates_refuted: 0,
        duration_ms: 0,
    };
    let verdict = verify_instrumented(&instrumented, backend, max_rounds, &mut outcome);
    outcome.verdict = verdict;
    outcome.duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        pair = %pair,
        verdict = verdict_name(&outcome.verdict),
        ms = outcome.duration_ms,
        "Checked pair"
    );
    Ok(outcome)
}

pub fn verdict_name(verdict: &PairVerdict) -> &'static str {
    match verdict {
        PairVerdict::Proved => "proved",
        PairVerdict::Disproved(_) => "disproved",
        PairVerdict::Inconclusive(_) => "inconclusive",
        PairVerdict::ResourceExhausted(_) => "resource_exhausted",
        PairVerdict::Failed(_) => "failed",
    }
}

fn verify_instrumented(
    instrumented: &PairProgram,
    backend: &dyn VerifierBackend,
    max_rounds: usize,
    outcome: &mut PairOutcome,
) -> PairVerdict {
    let houdini = match eliminate_candidates_bounded(backend, &instrumented.program, max_rounds) {
        Ok(houdini) => houdini,
        Err(e) => {
            tracing::warn!(pair = %instrumented.pair, error = %e, "Candidate elimination failed");
            return PairVerdict::Failed(e.to_string());
        }
    };
    outcome.candidates_proved = houdini.proved.len();
    outcome.candidates_refuted = houdini.refuted.len();
    let program = apply_candidates(&instrumented.program, &houdini);

    match backend.verify(&program, &instrumented.checker) {
        Ok(VerifierResult::Proved) => PairVerdict::Proved,
        Ok(VerifierResult::Disproved(cex)) => {
            let index = CaptureIndex::build(&program, &instrumented.instances);
            PairVerdict::Disproved(interpret(&index, &cex))
        }
        Ok(VerifierResult::Inconclusive(reason)) => PairVerdict::Inconclusive(reason),
        Ok(VerifierResult::ResourceExhausted(reason)) => PairVerdict::ResourceExhausted(reason),
        Err(e) => {
            tracing::warn!(pair = %instrumented.pair, error = %e, "Verifier failed");
            PairVerdict::Failed(e.to_string())
        }
    }
}

/// File name of the instrumented program of `checker`.
pub fn program_file_name(checker: &str) -> String {
    format!("{}.bpl", checker.replace(['$', '#'], "_"))
}

/// Write each instrumented program into `dir`, returning the paths written.
pub fn write_programs(
    dir: &Path,
    programs: &[PairProgram],
) -> Result<Vec<std::path::PathBuf>, DriverError> {
    std::fs::create_dir_all(dir).map_err(|e| DriverError::io(dir, e))?;
    let mut written = Vec::with_capacity(programs.len());
    for instrumented in programs {
        let path = dir.join(program_file_name(&instrumented.checker));
        std::fs::write(&path, instrumented.program.to_string())
            .map_err(|e| DriverError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "Wrote instrumented program");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_path_safe() {
        assert_eq!(program_file_name("check$open$close#net"), "check_open_close_net.bpl");
    }

    #[test]
    fn reports_only_for_disproved() {
        let verdict = PairVerdict::Disproved(vec![ErrorReport::Assertion {
            procedure: "p".into(),
        }]);
        assert_eq!(verdict.reports().len(), 1);
        assert!(PairVerdict::Proved.reports().is_empty());
    }
}
