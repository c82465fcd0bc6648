/// Structured JSON run report.
///
/// Produced with `--format json`. The report goes to stdout; progress and
/// logs stay on stderr.
use serde::Serialize;

use crate::error::Outcome;
use crate::report::ErrorReport;
use crate::run::{PairOutcome, PairVerdict, verdict_name};
use crate::stats::RunStatistics;

/// Complete run report in JSON format.
#[derive(Debug, Serialize)]
pub struct JsonRunReport {
    pub tool: String,
    pub version: String,
    /// RFC 3339 time the report was produced.
    pub timestamp: String,
    pub program: String,
    pub pairs: Vec<JsonPairResult>,
    pub summary: RunStatistics,
    pub outcome: Outcome,
}

/// Per-pair result in JSON format.
#[derive(Debug, Serialize)]
pub struct JsonPairResult {
    pub first: String,
    pub second: String,
    pub checker: String,
    /// "proved", "disproved", "inconclusive", "resource_exhausted", "failed"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
    pub candidates_proved: usize,
    pub candidates_refuted: usize,
    pub reports: Vec<JsonErrorReport>,
}

/// One interpreted failure with its printed form.
#[derive(Debug, Serialize)]
pub struct JsonErrorReport {
    #[serde(flatten)]
    pub report: ErrorReport,
    pub message: Vec<String>,
}

impl JsonPairResult {
    pub fn from_outcome(outcome: &PairOutcome) -> Self {
        let reason = match &outcome.verdict {
            PairVerdict::Inconclusive(r) | PairVerdict::ResourceExhausted(r) | PairVerdict::Failed(r) => {
                Some(r.clone())
            }
            PairVerdict::Proved | PairVerdict::Disproved(_) => None,
        };
        Self {
            first: outcome.pair.first.clone(),
            second: outcome.pair.second.clone(),
            checker: outcome.checker.clone(),
            status: verdict_name(&outcome.verdict).to_string(),
            reason,
            duration_ms: outcome.duration_ms,
            candidates_proved: outcome.candidates_proved,
            candidates_refuted: outcome.candidates_refuted,
            reports: outcome
                .verdict
                .reports()
                .iter()
                .map(|r| JsonErrorReport {
                    message: r.render(),
                    report: r.clone(),
                })
                .collect(),
        }
    }
}

impl JsonRunReport {
    pub fn new(program: &str, outcomes: &[PairOutcome]) -> Self {
        let summary = RunStatistics::from_outcomes(outcomes);
        Self {
            tool: "lockwatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            program: program.to_string(),
            pairs: outcomes.iter().map(JsonPairResult::from_outcome).collect(),
            outcome: summary.outcome(),
            summary,
        }
    }
}

/// Print a JSON run report to stdout.
pub fn print_json_report(report: &JsonRunReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("[lockwatch] Error serializing JSON report: {e}");
        }
    }
}
