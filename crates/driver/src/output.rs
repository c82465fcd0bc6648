/// Colored per-pair output.
///
/// ```text
///   [OK]           (open, open) 12ms
///   [RACE]         (open, close) 30ms
///   drv.c: error: potential write-write race:
///   ...
///   [INCONCLUSIVE] (open, xmit) timeout
///
/// Summary: 1 OK, 1 RACE, 1 INCONCLUSIVE (total: 50ms)
/// ```
use colored::Colorize;

use crate::diagnostics;
use crate::run::{PairOutcome, PairVerdict};
use crate::stats::RunStatistics;

/// Bracketed tag of a verdict.
pub fn status_tag(verdict: &PairVerdict) -> &'static str {
    match verdict {
        PairVerdict::Proved => "[OK]",
        PairVerdict::Disproved(reports) if reports.iter().any(|r| r.is_race()) => "[RACE]",
        PairVerdict::Disproved(reports) if reports.iter().any(|r| r.is_deadlock()) => "[DEADLOCK]",
        PairVerdict::Disproved(_) | PairVerdict::Failed(_) => "[FAIL]",
        PairVerdict::Inconclusive(_) => "[INCONCLUSIVE]",
        PairVerdict::ResourceExhausted(_) => "[EXHAUSTED]",
    }
}

fn colored_tag(verdict: &PairVerdict) -> colored::ColoredString {
    let tag = status_tag(verdict);
    match verdict {
        PairVerdict::Proved => tag.green().bold(),
        PairVerdict::Inconclusive(_) | PairVerdict::ResourceExhausted(_) => tag.yellow().bold(),
        _ => tag.red().bold(),
    }
}

/// The pair line without its tag.
pub fn pair_line(outcome: &PairOutcome, verbose: bool) -> String {
    let mut line = outcome.pair.to_string();
    match &outcome.verdict {
        PairVerdict::Inconclusive(reason)
        | PairVerdict::ResourceExhausted(reason)
        | PairVerdict::Failed(reason) => line.push_str(&format!(" ({reason})")),
        _ => {}
    }
    if verbose {
        line.push_str(&format!(" {}ms", outcome.duration_ms));
        if outcome.candidates_proved + outcome.candidates_refuted > 0 {
            line.push_str(&format!(
                ", candidates {}/{}",
                outcome.candidates_proved,
                outcome.candidates_proved + outcome.candidates_refuted
            ));
        }
    }
    line
}

/// Summary line, e.g. `2 OK, 1 RACE (total: 40ms)`.
pub fn summary_line(stats: &RunStatistics) -> String {
    let parts: Vec<String> = [
        (stats.proved, "OK"),
        (stats.races, "RACE"),
        (stats.deadlocks, "DEADLOCK"),
        (stats.inconclusive, "INCONCLUSIVE"),
        (stats.resource_exhausted, "EXHAUSTED"),
        (stats.failed, "FAIL"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect();

    let summary = if parts.is_empty() {
        "no pairs checked".to_string()
    } else {
        parts.join(", ")
    };
    if stats.total_ms > 0 {
        format!("{summary} (total: {}ms)", stats.total_ms)
    } else {
        summary
    }
}

fn print_report_line(line: &str) {
    match line.split_once("error:") {
        Some((location, message)) => {
            eprintln!("{}{}{}", location.bold(), "error:".red().bold(), message)
        }
        None => eprintln!("{line}"),
    }
}

/// Print every pair result, its reports, and the summary line to stderr.
pub fn print_outcomes(outcomes: &[PairOutcome], stats: &RunStatistics, verbose: bool) {
    if outcomes.is_empty() {
        eprintln!("{}", "No entry point pairs to check.".dimmed());
        return;
    }

    eprintln!();
    for outcome in outcomes {
        eprintln!("  {}  {}", colored_tag(&outcome.verdict), pair_line(outcome, verbose));
        for report in outcome.verdict.reports() {
            eprintln!();
            for line in report.render() {
                print_report_line(&line);
            }
            if let Some(rendered) = diagnostics::render_race_from_disk(report, true) {
                eprintln!("{rendered}");
            }
        }
    }

    eprintln!();
    eprintln!("Summary: {}", summary_line(stats));
    eprintln!();
}

/// Print a header for the run.
pub fn print_header(program: &str, pairs: usize) {
    eprintln!("{}", format!("Checking {program} ({pairs} pairs)").bold());
}
