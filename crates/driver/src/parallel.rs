//! Parallel pair processing using Rayon.
//!
//! Each pair is instrumented on its own copy of the program, so pairs are
//! independent and run on a pool sized by `--jobs`. Results come back in
//! pair order.

use rayon::prelude::*;

use lockwatch_analysis::{DriverAnalysis, EntryPointPair, PairProgram};
use lockwatch_verifier::VerifierBackend;

use crate::error::DriverError;
use crate::run::{PairOutcome, check_pair};

fn build_pool(jobs: usize) -> Result<rayon::ThreadPool, DriverError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| DriverError::ThreadPool(e.to_string()))
}

/// Instrument every pair.
pub fn instrument_pairs_parallel(
    analysis: &DriverAnalysis,
    pairs: &[EntryPointPair],
    jobs: usize,
) -> Result<Vec<PairProgram>, DriverError> {
    let pool = build_pool(jobs)?;
    let results: Vec<Result<PairProgram, DriverError>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| analysis.instrument(pair).map_err(DriverError::from))
            .collect()
    });
    results.into_iter().collect()
}

/// Check every pair. All pairs are attempted; the first instrumentation
/// error, if any, is returned after the others finish.
pub fn check_pairs_parallel(
    analysis: &DriverAnalysis,
    pairs: &[EntryPointPair],
    backend: &dyn VerifierBackend,
    jobs: usize,
    max_rounds: usize,
) -> Result<Vec<PairOutcome>, DriverError> {
    let pool = build_pool(jobs)?;
    tracing::info!(pairs = pairs.len(), jobs, "Checking pairs");
    let results: Vec<Result<PairOutcome, DriverError>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| check_pair(analysis, pair, backend, max_rounds))
            .collect()
    });
    results.into_iter().collect()
}
