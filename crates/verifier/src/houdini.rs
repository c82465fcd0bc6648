//! Houdini-style elimination of candidate invariants.
//!
//! Candidates are clauses `g ==> e` guarded by a boolean constant `g` marked
//! `{:existential true}`. Each round asks the back end which guards are
//! refuted while the rest are assumed, drops the refuted ones, and repeats
//! until nothing more is refuted. The surviving guards form the largest
//! inductive subset.

use std::collections::BTreeSet;

use lockwatch_ir::{BinOp, Cmd, Expr, Program, SpecClause};

use crate::backend::VerifierBackend;
use crate::error::VerifierError;

/// Attribute marking guard constants.
pub const EXISTENTIAL_ATTR: &str = "existential";
/// Attribute marking candidate loop invariant assertions.
pub const CANDIDATE_ATTR: &str = "candidate";

/// Result of candidate elimination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoudiniOutcome {
    /// Guards whose clauses survived every round.
    pub proved: BTreeSet<String>,
    pub refuted: BTreeSet<String>,
    /// Number of refutation queries issued.
    pub rounds: usize,
}

/// Names of all guard constants in `program`, in declaration order.
pub fn candidate_guards(program: &Program) -> Vec<String> {
    program
        .constants
        .iter()
        .filter(|c| c.attrs.has(EXISTENTIAL_ATTR))
        .map(|c| c.name.clone())
        .collect()
}

/// Run refutation rounds until a fixpoint.
pub fn eliminate_candidates(
    backend: &dyn VerifierBackend,
    program: &Program,
) -> Result<HoudiniOutcome, VerifierError> {
    eliminate_candidates_bounded(backend, program, usize::MAX)
}

/// Like [`eliminate_candidates`], but stops after `max_rounds` queries. Guards
/// still live when the bound is hit are not known to hold and count as
/// refuted.
pub fn eliminate_candidates_bounded(
    backend: &dyn VerifierBackend,
    program: &Program,
    max_rounds: usize,
) -> Result<HoudiniOutcome, VerifierError> {
    let mut live: BTreeSet<String> = candidate_guards(program).into_iter().collect();
    let mut refuted = BTreeSet::new();
    let mut rounds = 0;

    while !live.is_empty() {
        if rounds == max_rounds {
            tracing::warn!(rounds, live = live.len(), "Round limit reached; dropping remaining candidates");
            refuted.append(&mut live);
            break;
        }
        rounds += 1;
        let current = strip_candidates(program, &BTreeSet::new(), &refuted);
        let query: Vec<String> = live.iter().cloned().collect();
        let newly: BTreeSet<String> = backend
            .refute_candidates(&current, &query)?
            .into_iter()
            .filter(|g| live.contains(g))
            .collect();
        tracing::debug!(round = rounds, live = live.len(), refuted = newly.len(), "Houdini round");
        if newly.is_empty() {
            break;
        }
        for guard in newly {
            live.remove(&guard);
            refuted.insert(guard);
        }
    }

    tracing::info!(proved = live.len(), refuted = refuted.len(), rounds, "Candidate elimination done");
    Ok(HoudiniOutcome {
        proved: live,
        refuted,
        rounds,
    })
}

/// Rewrite `program` with the outcome applied: refuted candidates are
/// removed, proved ones become plain clauses, and guard constants go away.
pub fn apply_candidates(program: &Program, outcome: &HoudiniOutcome) -> Program {
    strip_candidates(program, &outcome.proved, &outcome.refuted)
}

/// The guard and fact of a `g ==> e` candidate clause.
fn split_candidate(expr: &Expr) -> Option<(&str, &Expr)> {
    match expr {
        Expr::Binary(BinOp::Implies, guard, fact) => guard.as_ident().map(|g| (g, fact.as_ref())),
        _ => None,
    }
}

enum Fate {
    Keep,
    Drop,
    Promote(Expr),
}

fn fate(expr: &Expr, proved: &BTreeSet<String>, refuted: &BTreeSet<String>) -> Fate {
    match split_candidate(expr) {
        Some((guard, _)) if refuted.contains(guard) => Fate::Drop,
        Some((guard, fact)) if proved.contains(guard) => Fate::Promote(fact.clone()),
        _ => Fate::Keep,
    }
}

fn strip_clauses(clauses: &mut Vec<SpecClause>, proved: &BTreeSet<String>, refuted: &BTreeSet<String>) {
    clauses.retain_mut(|clause| match fate(&clause.expr, proved, refuted) {
        Fate::Keep => true,
        Fate::Drop => false,
        Fate::Promote(fact) => {
            clause.expr = fact;
            true
        }
    });
}

fn strip_candidates(
    program: &Program,
    proved: &BTreeSet<String>,
    refuted: &BTreeSet<String>,
) -> Program {
    let mut program = program.clone();
    for proc in &mut program.procedures {
        strip_clauses(&mut proc.contract.requires, proved, refuted);
        strip_clauses(&mut proc.contract.ensures, proved, refuted);
        for block in &mut proc.blocks {
            block.cmds.retain_mut(|cmd| {
                let Cmd::Assert { attrs, expr } = cmd else {
                    return true;
                };
                if !attrs.has(CANDIDATE_ATTR) {
                    return true;
                }
                match fate(expr, proved, refuted) {
                    Fate::Keep => true,
                    Fate::Drop => false,
                    Fate::Promote(fact) => {
                        attrs.remove(CANDIDATE_ATTR);
                        *expr = fact;
                        true
                    }
                }
            });
        }
    }
    program
        .constants
        .retain(|c| !proved.contains(&c.name) && !refuted.contains(&c.name));
    program
}
