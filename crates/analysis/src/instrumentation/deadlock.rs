//! Lock-leak check at every return of an instance root.

use lockwatch_ir::{Attribute, Attributes, Cmd, Program};

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::instance::Instance;
use crate::lock::LockCatalog;
use crate::pipeline::Pass;

use super::{DEADLOCK_CHECKING_ATTR, check_locks_proc, cls_var, helper_procedure, literal};

pub struct DeadlockPass;

impl Pass for DeadlockPass {
    fn name(&self) -> &'static str {
        "deadlock"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        for inst in &ctx.instances {
            ctx.program.add_procedure(release_check(&ctx.locks, inst));
            insert_release_checks(&mut ctx.program, inst)?;
        }
        Ok(())
    }
}

/// `_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_$<inst>`: every lock is back to its
/// state on entry.
fn release_check(locks: &LockCatalog, inst: &Instance) -> lockwatch_ir::Procedure {
    let exempt: Vec<&str> = inst.deadlock_exempt().collect();
    let cmds = locks
        .iter()
        .filter(|lock| !exempt.contains(&lock.name.as_str()))
        .map(|lock| {
            let held_on_entry = lock.host_lock().is_some_and(|h| inst.entry.holds_host_lock(h));
            Cmd::Assert {
                attrs: Attributes::new().with(Attribute::flag(DEADLOCK_CHECKING_ATTR)),
                expr: literal(&cls_var(&lock.name, inst), held_on_entry),
            }
        })
        .collect();
    helper_procedure(check_locks_proc(inst), Vec::new(), Vec::new(), cmds, Vec::new())
}

fn insert_release_checks(program: &mut Program, inst: &Instance) -> Result<(), AnalysisError> {
    let callee = check_locks_proc(inst);
    let root = program
        .procedure_mut(&inst.root)
        .ok_or_else(|| AnalysisError::MissingProcedure(inst.root.clone()))?;
    for block in root.blocks.iter_mut().filter(|b| b.transfer.is_return()) {
        block.cmds.push(Cmd::call(&callee, Vec::new()));
    }
    Ok(())
}
