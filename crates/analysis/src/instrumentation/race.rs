//! Access instrumentation and race assertions.
//!
//! Every region access of an instance is followed by a call to
//! `_WRITE_LS_<region>_$<inst>` or `_READ_LS_<region>_$<inst>`. The helper
//! asserts that, if the other instance already made a conflicting access to
//! the same address, some lock was held by both, and then narrows this
//! instance's memory lockset to the locks currently held.

use std::collections::BTreeSet;

use lockwatch_ir::{Attribute, Attributes, Cmd, Expr, Program, Variable};

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::instance::{Instance, outside_network_window};
use crate::lock::LockCatalog;
use crate::pipeline::Pass;
use crate::shared_state::{AccessKind, MemoryRegion, accesses_of};

use super::strategy::ShadowStrategy;
use super::{
    ACCESS_ATTR, RACE_CHECKING_ATTR, RESOURCE_ATTR, cls_var, helper_procedure, mls_var,
    read_ls_proc, read_var, require_on_entry, rewrite_commands, write_ls_proc, written_var,
};

const PTR_PARAM: &str = "ptr";

/// Instruments every access and builds the per-region helpers.
pub struct RacePass;

impl Pass for RacePass {
    fn name(&self) -> &'static str {
        "race"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        let AnalysisContext {
            program,
            instances,
            locks,
            regions,
            strategy,
            ..
        } = ctx;

        let region_names: BTreeSet<&str> = regions.iter().map(|r| r.name.as_str()).collect();
        for inst in instances.iter_mut() {
            instrument_accesses(program, &region_names, inst)?;
        }

        for (idx, inst) in instances.iter().enumerate() {
            let other = &instances[1 - idx];
            for region in regions.iter().filter(|r| inst.flags.accesses_region(&r.name)) {
                declare_region_shadow(program, &**strategy, locks, region, inst, other)?;
            }
        }
        Ok(())
    }
}

/// Follow each access of `inst` with its helper call.
fn instrument_accesses(
    program: &mut Program,
    regions: &BTreeSet<&str>,
    inst: &mut Instance,
) -> Result<(), AnalysisError> {
    let skipped = outside_network_window(program, inst);
    if !skipped.is_empty() {
        tracing::debug!(
            instance = %inst.name,
            commands = skipped.len(),
            "Skipping accesses outside the network window"
        );
    }
    let names: Vec<String> = inst.procedures.iter().cloned().collect();
    for name in names {
        let proc = program
            .procedure_mut(&name)
            .ok_or_else(|| AnalysisError::MissingProcedure(name.clone()))?;
        rewrite_commands(proc, |label, idx, cmd| {
            if skipped.contains(&(name.clone(), label.to_string(), idx)) {
                return Ok(None);
            }
            let calls = access_calls(cmd, regions, inst);
            if calls.is_empty() {
                return Ok(None);
            }
            let mut out = Vec::with_capacity(calls.len() + 1);
            out.push(cmd.clone());
            out.extend(calls);
            Ok(Some(out))
        })?;
    }
    Ok(())
}

/// Helper calls for each region access made by `cmd`, recording them on `inst`.
fn access_calls(cmd: &Cmd, regions: &BTreeSet<&str>, inst: &mut Instance) -> Vec<Cmd> {
    accesses_of(cmd)
        .into_iter()
        .filter(|a| regions.contains(a.region.as_str()))
        .map(|a| {
            let callee = match a.kind {
                AccessKind::Write => {
                    inst.flags.record_write(&a.region);
                    write_ls_proc(&a.region, inst)
                }
                AccessKind::Read => {
                    inst.flags.record_read(&a.region);
                    read_ls_proc(&a.region, inst)
                }
            };
            Cmd::Call {
                attrs: Attributes::new()
                    .with(Attribute::string(RESOURCE_ATTR, &a.region))
                    .with(Attribute::string(ACCESS_ATTR, a.kind.as_str())),
                callee,
                // As written: a resolved root names entry values, which may be out of scope here.
                args: vec![a.address],
                outs: Vec::new(),
            }
        })
        .collect()
}

/// Shadow globals, entry state and access helpers of `region` for `inst`.
fn declare_region_shadow(
    program: &mut Program,
    strategy: &dyn ShadowStrategy,
    locks: &LockCatalog,
    region: &MemoryRegion,
    inst: &Instance,
    other: &Instance,
) -> Result<(), AnalysisError> {
    let index = region.index_type();
    let shadow_ty = strategy.shadow_type(&index);
    strategy.declare_region(program, &region.name, &index);

    for lock in locks.iter() {
        let var = mls_var(&region.name, &lock.name, inst);
        program.add_global(Variable::new(&var, shadow_ty.clone()));
        require_on_entry(program, inst, strategy.everywhere(&var, true, &index))?;
    }
    for var in [written_var(&region.name, inst), read_var(&region.name, inst)] {
        program.add_global(Variable::new(&var, shadow_ty.clone()));
        require_on_entry(program, inst, strategy.everywhere(&var, false, &index))?;
    }

    let counts = inst.flags.accesses.get(&region.name).copied().unwrap_or_default();
    let shared = other.flags.accesses_region(&region.name);
    for (kind, count) in [(AccessKind::Write, counts.writes), (AccessKind::Read, counts.reads)] {
        if count == 0 {
            continue;
        }
        program.add_procedure(access_helper(strategy, locks, region, kind, inst, shared.then_some(other)));
    }
    tracing::debug!(
        instance = %inst.name,
        region = %region.name,
        reads = counts.reads,
        writes = counts.writes,
        checked = shared,
        "Declared region shadow state"
    );
    Ok(())
}

/// `_WRITE_LS_*` / `_READ_LS_*` helper. Without an `other` instance touching
/// the region the helper only narrows, with no assertion.
fn access_helper(
    strategy: &dyn ShadowStrategy,
    locks: &LockCatalog,
    region: &MemoryRegion,
    kind: AccessKind,
    inst: &Instance,
    other: Option<&Instance>,
) -> lockwatch_ir::Procedure {
    let index = region.index_type();
    let ptr = Expr::ident(PTR_PARAM);
    let guard = strategy.access_guard(&region.name, &ptr, &index);
    let tracked = !guard.guard.is_true();
    let mut cmds = guard.setup;

    if let Some(other) = other {
        let written = strategy.cell(&written_var(&region.name, other), &ptr);
        let conflict = match kind {
            AccessKind::Write => {
                Expr::or(written, strategy.cell(&read_var(&region.name, other), &ptr))
            }
            AccessKind::Read => written,
        };
        let premise = if tracked {
            Expr::and(guard.guard.clone(), conflict)
        } else {
            conflict
        };
        let common_lock = Expr::or_all(locks.iter().map(|lock| {
            Expr::and(
                strategy.cell(&mls_var(&region.name, &lock.name, other), &ptr),
                Expr::ident(cls_var(&lock.name, inst)),
            )
        }));
        cmds.push(Cmd::Assert {
            attrs: Attributes::new()
                .with(Attribute::flag(RACE_CHECKING_ATTR))
                .with(Attribute::string(RESOURCE_ATTR, &region.name))
                .with(Attribute::string(ACCESS_ATTR, kind.as_str())),
            expr: Expr::implies(premise, common_lock),
        });
    }

    let mut modifies = Vec::new();
    for lock in locks.iter() {
        let var = mls_var(&region.name, &lock.name, inst);
        let current = strategy.cell(&var, &ptr);
        let narrowed = Expr::and(current.clone(), Expr::ident(cls_var(&lock.name, inst)));
        let rhs = if tracked {
            Expr::ite(guard.guard.clone(), narrowed, current)
        } else {
            narrowed
        };
        cmds.push(Cmd::assign(strategy.cell_lhs(&var, &ptr), rhs));
        modifies.push(var);
    }

    let flag = match kind {
        AccessKind::Write => written_var(&region.name, inst),
        AccessKind::Read => read_var(&region.name, inst),
    };
    let rhs = if tracked {
        Expr::or(guard.guard.clone(), strategy.cell(&flag, &ptr))
    } else {
        Expr::bool(true)
    };
    cmds.push(Cmd::assign(strategy.cell_lhs(&flag, &ptr), rhs));
    modifies.push(flag);

    let name = match kind {
        AccessKind::Write => write_ls_proc(&region.name, inst),
        AccessKind::Read => read_ls_proc(&region.name, inst),
    };
    helper_procedure(
        name,
        vec![Variable::new(PTR_PARAM, index)],
        guard.locals,
        cmds,
        modifies,
    )
}
