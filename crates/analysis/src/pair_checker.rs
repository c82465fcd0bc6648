//! Merges both instance roots into the procedure handed to the verifier.
//!
//! `check$<a>$<b>` runs the first instance's root, then havocs every region
//! to stand for arbitrary interference, then runs the second root. The race
//! helpers compare against the other side's recorded accesses, so sequential
//! composition suffices for the pairwise check.

use std::collections::{BTreeMap, BTreeSet};

use lockwatch_ir::{Attribute, Block, Cmd, Procedure, Program, SpecClause, Transfer, Variable};

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::pipeline::Pass;

/// Attribute marking the checker procedure.
pub const ENTRY_PAIR_ATTR: &str = "entry_pair";

const JOIN_LABEL: &str = "$join";

/// Builds the pair checker and drops the original implementations.
pub struct PairCheckerPass;

impl Pass for PairCheckerPass {
    fn name(&self) -> &'static str {
        "pair-checker"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        let name = ctx.pair.checker_name();
        let roots = [ctx.instances[0].root.clone(), ctx.instances[1].root.clone()];

        let mut halves = Vec::with_capacity(2);
        for root in &roots {
            let proc = ctx
                .program
                .procedure(root)
                .cloned()
                .ok_or_else(|| AnalysisError::MissingProcedure(root.clone()))?;
            halves.push(proc);
        }
        let regions: Vec<String> = ctx.regions.iter().map(|r| r.name.clone()).collect();
        let checker = build_checker(&name, &halves[0], &halves[1], &regions);

        ctx.program.add_procedure(checker);
        for root in &roots {
            // A recursive root is still called by its own copy.
            if ctx.program.call_sites(root).next().is_none() {
                ctx.program.remove_procedure(root);
            }
            ctx.candidates.rename_procedure(root, &name);
        }
        // Instance copies never call back into the originals.
        for base in &ctx.base_procedures {
            ctx.program.remove_procedure(base);
        }
        complete_modifies(&mut ctx.program);

        tracing::info!(pair = %ctx.pair, checker = %name, "Built pair checker");
        ctx.checker = Some(name);
        Ok(())
    }
}

/// Rename map for the formals, outputs and locals of `proc` on `side`.
fn side_renames(proc: &Procedure, side: u8) -> BTreeMap<String, String> {
    proc.params
        .iter()
        .chain(&proc.returns)
        .chain(&proc.locals)
        .map(|v| (v.name.clone(), format!("{}${side}", v.name)))
        .collect()
}

fn renamed_var(var: &Variable, renames: &BTreeMap<String, String>) -> Variable {
    let mut var = var.clone();
    if let Some(name) = renames.get(&var.name) {
        var.name = name.clone();
    }
    var
}

/// Sequential composition of `first` and `second`, joined by a havoc of
/// every region.
pub fn build_checker(name: &str, first: &Procedure, second: &Procedure, regions: &[String]) -> Procedure {
    let mut checker = Procedure::new(name);
    checker.attrs.push(Attribute::flag(ENTRY_PAIR_ATTR));

    let second_entry = second
        .entry_label()
        .map(|l| format!("{l}$2"))
        .unwrap_or_else(|| JOIN_LABEL.to_string());

    for (side, proc) in [(1u8, first), (2u8, second)] {
        let renames = side_renames(proc, side);
        let rename = |n: &str| renames.get(n).cloned();

        checker.params.extend(proc.params.iter().map(|v| renamed_var(v, &renames)));
        checker.locals.extend(
            proc.returns
                .iter()
                .chain(&proc.locals)
                .map(|v| renamed_var(v, &renames)),
        );
        checker.contract.requires.extend(proc.contract.requires.iter().map(|c| SpecClause {
            expr: c.expr.rename(&rename),
            free: c.free,
            attrs: c.attrs.clone(),
        }));
        for var in &proc.contract.modifies {
            checker.contract.add_modifies(var.clone());
        }

        for block in &proc.blocks {
            let transfer = match &block.transfer {
                Transfer::Goto(targets) => {
                    Transfer::Goto(targets.iter().map(|t| format!("{t}${side}")).collect())
                }
                Transfer::Return if side == 1 => Transfer::Goto(vec![JOIN_LABEL.to_string()]),
                Transfer::Return => Transfer::Return,
            };
            checker.blocks.push(Block::new(
                format!("{}${side}", block.label),
                block.cmds.iter().map(|c| c.rename_vars(&rename)).collect(),
                transfer,
            ));
        }

        if side == 1 {
            let mut cmds = Vec::new();
            if !regions.is_empty() {
                cmds.push(Cmd::havoc(regions.to_vec()));
            }
            let transfer = if second.blocks.is_empty() {
                Transfer::Return
            } else {
                Transfer::Goto(vec![second_entry.clone()])
            };
            checker.blocks.push(Block::new(JOIN_LABEL, cmds, transfer));
        }
    }
    checker
}

/// Close every implementation's frame over the globals it or its callees
/// write. Iterates to a fixpoint so recursion is covered.
pub fn complete_modifies(program: &mut Program) {
    let globals: BTreeSet<String> = program.globals.iter().map(|g| g.name.clone()).collect();

    let mut frames: BTreeMap<String, BTreeSet<String>> = program
        .procedures
        .iter()
        .map(|p| {
            let mut frame: BTreeSet<String> = p.contract.modifies.iter().cloned().collect();
            for (_, _, cmd) in p.commands() {
                frame.extend(
                    cmd.defined_vars()
                        .into_iter()
                        .filter(|v| globals.contains(*v))
                        .map(str::to_string),
                );
            }
            (p.name.clone(), frame)
        })
        .collect();

    let calls: BTreeMap<String, Vec<String>> = program
        .procedures
        .iter()
        .map(|p| (p.name.clone(), p.callees()))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (caller, callees) in &calls {
            let inherited: BTreeSet<String> = callees
                .iter()
                .filter_map(|c| frames.get(c))
                .flatten()
                .cloned()
                .collect();
            if let Some(frame) = frames.get_mut(caller) {
                let before = frame.len();
                frame.extend(inherited);
                changed |= frame.len() != before;
            }
        }
    }

    for proc in &mut program.procedures {
        if proc.is_declaration() {
            continue;
        }
        if let Some(frame) = frames.get(&proc.name) {
            for var in frame {
                proc.contract.add_modifies(var.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Expr, Lhs, Type};

    fn make_root(name: &str) -> Procedure {
        let mut proc = Procedure::new(name);
        proc.params.push(Variable::new("dev", Type::Int));
        proc.returns.push(Variable::new("r", Type::Int));
        proc.locals.push(Variable::new("t", Type::Int));
        proc.contract
            .requires
            .push(SpecClause::new(Expr::eq(Expr::ident("dev"), Expr::int(0))));
        proc.blocks = vec![
            Block::new(
                "bb0",
                vec![Cmd::assign(Lhs::var("t"), Expr::ident("dev"))],
                Transfer::Goto(vec!["bb1".into()]),
            ),
            Block::new(
                "bb1",
                vec![Cmd::assign(Lhs::var("r"), Expr::ident("t"))],
                Transfer::Return,
            ),
        ];
        proc
    }

    // ====== Checker tests ======

    #[test]
    fn checker_renames_both_halves() {
        let checker = build_checker("check$a$b", &make_root("a$1"), &make_root("b$2"), &[]);
        assert!(checker.attrs.has(ENTRY_PAIR_ATTR));
        let params: Vec<&str> = checker.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["dev$1", "dev$2"]);
        let locals: BTreeSet<&str> = checker.locals.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(locals, BTreeSet::from(["r$1", "t$1", "r$2", "t$2"]));
        assert_eq!(checker.contract.requires.len(), 2);
        assert_eq!(checker.contract.requires[1].expr.to_string(), "dev$2 == 0");
        assert_eq!(
            checker.block("bb1$1").unwrap().cmds[0].to_string(),
            "r$1 := t$1;"
        );
    }

    #[test]
    fn first_half_returns_through_join() {
        let regions = vec!["$M.0".to_string(), "$M.1".to_string()];
        let checker = build_checker("check$a$b", &make_root("a$1"), &make_root("b$2"), &regions);
        let labels: Vec<&str> = checker.blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["bb0$1", "bb1$1", JOIN_LABEL, "bb0$2", "bb1$2"]);
        assert_eq!(checker.block("bb1$1").unwrap().transfer.targets(), [JOIN_LABEL.to_string()]);
        let join = checker.block(JOIN_LABEL).unwrap();
        assert_eq!(join.cmds[0].to_string(), "havoc $M.0, $M.1;");
        assert_eq!(join.transfer.targets(), ["bb0$2".to_string()]);
        assert!(checker.block("bb1$2").unwrap().transfer.is_return());
    }

    // ====== Modifies tests ======

    #[test]
    fn modifies_closes_over_callees() {
        let mut program = Program::new();
        program.add_global(Variable::new("G", Type::Int));
        program.add_global(Variable::new("H", Type::Bool));

        let mut leaf = Procedure::new("leaf");
        leaf.blocks = vec![Block::new(
            "bb0",
            vec![Cmd::assign(Lhs::var("G"), Expr::int(1))],
            Transfer::Return,
        )];
        let mut mid = Procedure::new("mid");
        mid.blocks = vec![Block::new(
            "bb0",
            vec![Cmd::call("leaf", vec![]), Cmd::havoc(vec!["H".into()])],
            Transfer::Return,
        )];
        let mut top = Procedure::new("top");
        top.blocks = vec![Block::new("bb0", vec![Cmd::call("mid", vec![])], Transfer::Return)];
        program.add_procedure(leaf);
        program.add_procedure(mid);
        program.add_procedure(top);

        complete_modifies(&mut program);
        let top = program.procedure("top").unwrap();
        let frame: BTreeSet<&str> = top.contract.modifies.iter().map(String::as_str).collect();
        assert_eq!(frame, BTreeSet::from(["G", "H"]));
        assert_eq!(program.procedure("leaf").unwrap().contract.modifies, vec!["G".to_string()]);
    }

    #[test]
    fn modifies_handles_recursion() {
        let mut program = Program::new();
        program.add_global(Variable::new("G", Type::Int));
        let mut even = Procedure::new("even");
        even.blocks = vec![Block::new("bb0", vec![Cmd::call("odd", vec![])], Transfer::Return)];
        let mut odd = Procedure::new("odd");
        odd.blocks = vec![Block::new(
            "bb0",
            vec![Cmd::call("even", vec![]), Cmd::assign(Lhs::var("G"), Expr::int(0))],
            Transfer::Return,
        )];
        program.add_procedure(even);
        program.add_procedure(odd);
        complete_modifies(&mut program);
        assert_eq!(program.procedure("even").unwrap().contract.modifies, vec!["G".to_string()]);
    }
}
