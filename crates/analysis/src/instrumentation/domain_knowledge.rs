//! Host-specific state: device registration and network data-path changes.

use lockwatch_ir::{Cmd, Expr, Lhs, Type, Variable};

use crate::context::AnalysisContext;
use crate::domain::HostCall;
use crate::error::AnalysisError;
use crate::pipeline::Pass;

use super::{
    device_registered_var, helper_procedure, literal, register_device_proc, require_on_entry,
    rewrite_commands,
};

const IS_REGISTERED_PARAM: &str = "isRegistered";

/// Models `register_netdev`/`unregister_netdev` through
/// `DEVICE_IS_REGISTERED_$<inst>` and records network enable/disable calls.
pub struct DomainKnowledgePass;

impl Pass for DomainKnowledgePass {
    fn name(&self) -> &'static str {
        "domain-knowledge"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        let AnalysisContext {
            program, instances, ..
        } = ctx;
        for inst in instances.iter_mut() {
            let var = device_registered_var(inst);
            program.add_global(Variable::new(&var, Type::Bool));
            require_on_entry(program, inst, literal(&var, !inst.entry.is_init))?;
            program.add_procedure(helper_procedure(
                register_device_proc(inst),
                vec![Variable::new(IS_REGISTERED_PARAM, Type::Bool)],
                Vec::new(),
                vec![Cmd::assign(Lhs::var(&var), Expr::ident(IS_REGISTERED_PARAM))],
                [var.clone()],
            ));

            let helper = register_device_proc(inst);
            let names: Vec<String> = inst.procedures.iter().cloned().collect();
            for name in names {
                let proc = program
                    .procedure_mut(&name)
                    .ok_or_else(|| AnalysisError::MissingProcedure(name.clone()))?;
                rewrite_commands(proc, |_, _, cmd| {
                    let Some(call) = cmd.callee().and_then(HostCall::classify) else {
                        return Ok(None);
                    };
                    match call {
                        HostCall::Registration(registered) => {
                            inst.flags.changes_registration = true;
                            let mut out =
                                vec![Cmd::call(&helper, vec![Expr::bool(registered)])];
                            if let Cmd::Call { outs, .. } = cmd
                                && !outs.is_empty()
                            {
                                out.push(Cmd::havoc(outs.clone()));
                            }
                            Ok(Some(out))
                        }
                        HostCall::DisableNetwork | HostCall::EnableNetwork => {
                            inst.flags.changes_network = true;
                            Ok(None)
                        }
                        _ => Ok(None),
                    }
                })?;
            }
            tracing::debug!(
                instance = %inst.name,
                registration = inst.flags.changes_registration,
                network = inst.flags.changes_network,
                "Applied domain knowledge"
            );
        }
        Ok(())
    }
}
