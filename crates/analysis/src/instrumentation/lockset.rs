//! Current-lockset tracking: one boolean per lock and instance, updated by
//! every lock operation through `_UPDATE_CLS_$<inst>`.

use lockwatch_ir::{Cmd, Expr, Program, Type, Variable};

use crate::context::AnalysisContext;
use crate::domain::{HostCall, HostLock};
use crate::error::AnalysisError;
use crate::instance::Instance;
use crate::lock::LockCatalog;
use crate::pipeline::Pass;

use super::{cls_var, helper_procedure, literal, require_on_entry, rewrite_commands, update_cls_proc};

const LOCK_PARAM: &str = "lock";
const IS_LOCKED_PARAM: &str = "isLocked";

/// Turns lock operations into current-lockset updates.
pub struct LocksetPass;

impl Pass for LocksetPass {
    fn name(&self) -> &'static str {
        "lockset"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        for idx in 0..ctx.instances.len() {
            let AnalysisContext {
                program,
                instances,
                locks,
                ..
            } = ctx;
            let inst = &mut instances[idx];
            declare_current_lockset(program, locks, inst)?;
            let update = update_cls_proc(inst);
            let names: Vec<String> = inst.procedures.iter().cloned().collect();
            for name in names {
                let proc = program
                    .procedure_mut(&name)
                    .ok_or_else(|| AnalysisError::MissingProcedure(name.clone()))?;
                rewrite_commands(proc, |_, _, cmd| lock_update(cmd, &name, &update, locks, inst))?;
            }
            tracing::debug!(
                instance = %inst.name,
                operated = inst.operated_locks.len(),
                implied = inst.implied_locks.len(),
                "Instrumented current lockset"
            );
        }
        Ok(())
    }
}

/// Globals, entry state and update helper of one instance's current lockset.
fn declare_current_lockset(
    program: &mut Program,
    locks: &LockCatalog,
    inst: &Instance,
) -> Result<(), AnalysisError> {
    let mut cmds = Vec::new();
    let mut modifies = Vec::new();
    for lock in locks.iter() {
        let var = cls_var(&lock.name, inst);
        program.add_global(Variable::new(&var, Type::Bool));
        let held = lock.host_lock().is_some_and(|h| inst.entry.holds_host_lock(h));
        require_on_entry(program, inst, literal(&var, held))?;
        cmds.push(Cmd::assign(
            lockwatch_ir::Lhs::var(&var),
            Expr::ite(
                Expr::eq(Expr::ident(LOCK_PARAM), lock.constant()),
                Expr::ident(IS_LOCKED_PARAM),
                Expr::ident(&var),
            ),
        ));
        modifies.push(var);
    }
    program.add_procedure(helper_procedure(
        update_cls_proc(inst),
        vec![
            Variable::new(LOCK_PARAM, Type::Int),
            Variable::new(IS_LOCKED_PARAM, Type::Bool),
        ],
        Vec::new(),
        cmds,
        modifies,
    ));
    Ok(())
}

/// The update replacing `cmd`, if it is a lock operation.
fn lock_update(
    cmd: &Cmd,
    proc: &str,
    update: &str,
    locks: &LockCatalog,
    inst: &mut Instance,
) -> Result<Option<Vec<Cmd>>, AnalysisError> {
    let Some(callee) = cmd.callee() else {
        return Ok(None);
    };
    let Some(call) = HostCall::classify(callee) else {
        return Ok(None);
    };
    let (lock, acquire) = match call {
        HostCall::Acquire | HostCall::Release => {
            let lock = cmd
                .call_args()
                .first()
                .and_then(Expr::as_ident)
                .and_then(|name| locks.get(name))
                .ok_or_else(|| AnalysisError::MalformedLockCall {
                    procedure: proc.to_string(),
                    callee: callee.to_string(),
                })?;
            (lock, call == HostCall::Acquire)
        }
        HostCall::HostAcquire(h) | HostCall::HostRelease(h) | HostCall::ImpliesHeld(h) => {
            let lock = locks.host(h).ok_or_else(|| {
                AnalysisError::Invariant(format!("host lock '{h}' missing from catalog"))
            })?;
            (lock, !matches!(call, HostCall::HostRelease(_)))
        }
        _ => return Ok(None),
    };

    match call {
        HostCall::ImpliesHeld(h) => {
            inst.implied_locks.insert(lock.name.clone());
            match h {
                HostLock::Rtnl => inst.flags.calls_rtnl_assertion = true,
                HostLock::Tx => inst.flags.calls_tx_implication = true,
                _ => {}
            }
        }
        _ => {
            inst.operated_locks.insert(lock.name.clone());
            if acquire {
                inst.flags.holds_lock = true;
            }
            match call.host_lock() {
                Some(HostLock::Power) => inst.flags.calls_power_lock = true,
                Some(HostLock::Rtnl) => inst.flags.calls_rtnl_assertion = true,
                _ => {}
            }
        }
    }

    let mut out = vec![Cmd::call(update, vec![lock.constant(), Expr::bool(acquire)])];
    if let Cmd::Call { outs, .. } = cmd
        && !outs.is_empty()
    {
        out.push(Cmd::havoc(outs.clone()));
    }
    Ok(Some(out))
}
