use serde::Serialize;

use crate::error::Outcome;
use crate::run::{PairOutcome, PairVerdict};

/// Aggregate counts over all checked pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub pairs: usize,
    pub proved: usize,
    pub disproved: usize,
    pub inconclusive: usize,
    pub resource_exhausted: usize,
    pub failed: usize,
    pub races: usize,
    pub deadlocks: usize,
    pub total_ms: u64,
}

impl RunStatistics {
    pub fn from_outcomes(outcomes: &[PairOutcome]) -> Self {
        let mut stats = Self {
            pairs: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            stats.total_ms += outcome.duration_ms;
            match &outcome.verdict {
                PairVerdict::Proved => stats.proved += 1,
                PairVerdict::Disproved(reports) => {
                    stats.disproved += 1;
                    stats.races += reports.iter().filter(|r| r.is_race()).count();
                    stats.deadlocks += reports.iter().filter(|r| r.is_deadlock()).count();
                }
                PairVerdict::Inconclusive(_) => stats.inconclusive += 1,
                PairVerdict::ResourceExhausted(_) => stats.resource_exhausted += 1,
                PairVerdict::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }

    /// Exit status of the run: any disproved pair is a lockset error; a
    /// verifier failure is fatal. Inconclusive pairs do not fail the run.
    pub fn outcome(&self) -> Outcome {
        if self.disproved > 0 {
            Outcome::LocksetAnalysisError
        } else if self.failed > 0 {
            Outcome::FatalError
        } else {
            Outcome::Done
        }
    }
}
