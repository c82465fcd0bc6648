//! Candidate pre/postconditions and loop invariants over shadow state.
//!
//! Instrumentation is intraprocedural; candidates let the verifier carry
//! lockset, access and registration facts across calls and loops. Each
//! candidate is guarded by a fresh `{:existential true}` constant. Which
//! guards survive is decided later by candidate elimination; here they are
//! only generated and recorded in a [`CandidateTable`].

pub mod access;
pub mod domain;
pub mod lockset;

use std::collections::BTreeSet;
use std::fmt;

use lockwatch_ir::{Attribute, Attributes, Cfg, Cmd, Constant, Expr, Procedure, Program, SpecClause, Type};
use serde::Serialize;

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::pipeline::Pass;

/// Attribute of loop-invariant candidate assertions.
pub const CANDIDATE_ATTR: &str = "candidate";
/// Attribute of guard constants.
pub const EXISTENTIAL_ATTR: &str = "existential";

/// Which shadow state a guard speaks about; part of the guard name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardFamily {
    Lockset,
    Access,
    Domain,
}

impl GuardFamily {
    pub fn prefix(self) -> &'static str {
        match self {
            GuardFamily::Lockset => "ls",
            GuardFamily::Access => "ac",
            GuardFamily::Domain => "dk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Requires,
    Ensures,
    LoopInvariant,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Requires => write!(f, "requires"),
            CandidateKind::Ensures => write!(f, "ensures"),
            CandidateKind::LoopInvariant => write!(f, "loop invariant"),
        }
    }
}

/// One guarded clause `guard ==> fact`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub guard: String,
    pub fact: Expr,
    pub kind: CandidateKind,
    pub procedure: String,
    pub family: GuardFamily,
}

impl Candidate {
    pub fn clause(&self) -> Expr {
        Expr::implies(Expr::ident(&self.guard), self.fact.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateTable {
    candidates: Vec<Candidate>,
}

impl CandidateTable {
    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn guards(&self) -> BTreeSet<String> {
        self.candidates.iter().map(|c| c.guard.clone()).collect()
    }

    pub fn get(&self, guard: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.guard == guard)
    }

    pub fn for_procedure<'a>(&'a self, procedure: &'a str) -> impl Iterator<Item = &'a Candidate> + 'a {
        self.candidates.iter().filter(move |c| c.procedure == procedure)
    }

    /// Re-home candidates after `from` was merged into `to`.
    pub fn rename_procedure(&mut self, from: &str, to: &str) {
        for c in self.candidates.iter_mut().filter(|c| c.procedure == from) {
            c.procedure = to.to_string();
        }
    }
}

/// A shadow fact with both polarities offered as candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryFact {
    pub family: GuardFamily,
    pub holds: Expr,
    pub fails: Expr,
}

impl SummaryFact {
    /// Fact about a boolean scalar.
    pub fn scalar(family: GuardFamily, var: &str) -> Self {
        Self {
            family,
            holds: Expr::ident(var),
            fails: Expr::not(Expr::ident(var)),
        }
    }

    fn polarities(&self) -> [&Expr; 2] {
        [&self.holds, &self.fails]
    }
}

/// Hands out `_b$<family>$<inst>$N` guards.
#[derive(Debug)]
struct GuardNames<'a> {
    instance: &'a str,
    next: [usize; 3],
}

impl<'a> GuardNames<'a> {
    fn new(instance: &'a str) -> Self {
        Self {
            instance,
            next: [0; 3],
        }
    }

    fn fresh(&mut self, family: GuardFamily) -> String {
        let slot = family as usize;
        let n = self.next[slot];
        self.next[slot] += 1;
        format!("_b${}${}${n}", family.prefix(), self.instance)
    }
}

/// Adds candidates to every instance procedure.
pub struct SummaryPass;

impl Pass for SummaryPass {
    fn name(&self) -> &'static str {
        "summaries"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        for idx in 0..ctx.instances.len() {
            let inst = &ctx.instances[idx];
            let mut facts = lockset::facts(ctx, inst);
            facts.extend(access::facts(ctx, inst));
            facts.extend(domain::facts(inst));

            let inst = ctx.instances[idx].clone();
            let mut names = GuardNames::new(&inst.name);
            let before = ctx.candidates.len();
            for proc_name in &inst.procedures {
                let proc = ctx
                    .program
                    .procedure_mut(proc_name)
                    .ok_or_else(|| AnalysisError::MissingProcedure(proc_name.clone()))?;
                let mut generated = Vec::new();
                if !inst.is_root(proc_name) {
                    generated.extend(add_contract_candidates(proc, &facts, &mut names));
                }
                generated.extend(add_loop_candidates(proc, &facts, &mut names));
                for candidate in generated {
                    ctx.program.add_constant(
                        Constant::new(&candidate.guard, Type::Bool)
                            .with_attr(Attribute::expr(EXISTENTIAL_ATTR, Expr::bool(true))),
                    );
                    ctx.candidates.push(candidate);
                }
            }
            tracing::debug!(
                instance = %inst.name,
                facts = facts.len(),
                candidates = ctx.candidates.len() - before,
                "Generated summary candidates"
            );
        }
        Ok(())
    }
}

fn add_contract_candidates(
    proc: &mut Procedure,
    facts: &[SummaryFact],
    names: &mut GuardNames<'_>,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for kind in [CandidateKind::Requires, CandidateKind::Ensures] {
        for fact in facts {
            for expr in fact.polarities() {
                let candidate = Candidate {
                    guard: names.fresh(fact.family),
                    fact: expr.clone(),
                    kind,
                    procedure: proc.name.clone(),
                    family: fact.family,
                };
                let clause = SpecClause::new(candidate.clause());
                match kind {
                    CandidateKind::Requires => proc.contract.requires.push(clause),
                    _ => proc.contract.ensures.push(clause),
                }
                out.push(candidate);
            }
        }
    }
    out
}

fn add_loop_candidates(
    proc: &mut Procedure,
    facts: &[SummaryFact],
    names: &mut GuardNames<'_>,
) -> Vec<Candidate> {
    let headers = Cfg::build(proc).loop_headers();
    let mut out = Vec::new();
    let proc_name = proc.name.clone();
    for header in headers {
        let Some(block) = proc.block_mut(&header) else {
            continue;
        };
        let mut asserts = Vec::new();
        for fact in facts {
            for expr in fact.polarities() {
                let candidate = Candidate {
                    guard: names.fresh(fact.family),
                    fact: expr.clone(),
                    kind: CandidateKind::LoopInvariant,
                    procedure: proc_name.clone(),
                    family: fact.family,
                };
                asserts.push(Cmd::Assert {
                    attrs: Attributes::new().with(Attribute::flag(CANDIDATE_ATTR)),
                    expr: candidate.clause(),
                });
                out.push(candidate);
            }
        }
        block.cmds.splice(0..0, asserts);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Block, Transfer};

    fn make_loop_proc() -> Procedure {
        let mut proc = Procedure::new("helper$1");
        proc.blocks = vec![
            Block::new("bb0", vec![], Transfer::Goto(vec!["head".into()])),
            Block::new("head", vec![Cmd::assume(Expr::bool(true))], Transfer::Goto(vec!["head".into(), "exit".into()])),
            Block::new("exit", vec![], Transfer::Return),
        ];
        proc
    }

    // ====== Guard tests ======

    #[test]
    fn guards_are_numbered_per_family() {
        let mut names = GuardNames::new("ep$1");
        assert_eq!(names.fresh(GuardFamily::Lockset), "_b$ls$ep$1$0");
        assert_eq!(names.fresh(GuardFamily::Lockset), "_b$ls$ep$1$1");
        assert_eq!(names.fresh(GuardFamily::Access), "_b$ac$ep$1$0");
        assert_eq!(names.fresh(GuardFamily::Domain), "_b$dk$ep$1$0");
    }

    // ====== Candidate tests ======

    #[test]
    fn contract_candidates_cover_both_polarities() {
        let mut proc = make_loop_proc();
        let facts = vec![SummaryFact::scalar(GuardFamily::Lockset, "CLS_lock$0_$ep$1")];
        let mut names = GuardNames::new("ep$1");
        let out = add_contract_candidates(&mut proc, &facts, &mut names);
        assert_eq!(out.len(), 4);
        assert_eq!(proc.contract.requires.len(), 2);
        assert_eq!(proc.contract.ensures.len(), 2);
        assert_eq!(
            proc.contract.requires[1].expr.to_string(),
            "_b$ls$ep$1$1 ==> !CLS_lock$0_$ep$1"
        );
    }

    #[test]
    fn loop_candidates_go_to_headers() {
        let mut proc = make_loop_proc();
        let facts = vec![SummaryFact::scalar(GuardFamily::Domain, "DEVICE_IS_REGISTERED_$ep$1")];
        let mut names = GuardNames::new("ep$1");
        let out = add_loop_candidates(&mut proc, &facts, &mut names);
        assert_eq!(out.len(), 2);
        let head = proc.block("head").unwrap();
        assert_eq!(head.cmds.len(), 3);
        assert!(head.cmds[0].attrs().unwrap().has(CANDIDATE_ATTR));
        assert!(proc.block("bb0").unwrap().cmds.is_empty());
    }

    #[test]
    fn table_renames_procedures() {
        let mut table = CandidateTable::default();
        table.push(Candidate {
            guard: "_b$ls$ep$1$0".into(),
            fact: Expr::ident("X"),
            kind: CandidateKind::LoopInvariant,
            procedure: "ep$1".into(),
            family: GuardFamily::Lockset,
        });
        table.rename_procedure("ep$1", "check$ep$ep");
        assert_eq!(table.for_procedure("check$ep$ep").count(), 1);
        assert_eq!(table.guards().len(), 1);
    }
}
