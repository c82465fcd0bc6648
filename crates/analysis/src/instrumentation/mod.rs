//! Rewrites that add shadow state and checks to each instance.
//!
//! Naming of everything generated here is fixed, since counterexample
//! interpretation and candidate generation find the shadow state by name.

pub mod deadlock;
pub mod domain_knowledge;
pub mod error_reporting;
pub mod lockset;
pub mod race;
pub mod strategy;

pub use deadlock::DeadlockPass;
pub use domain_knowledge::DomainKnowledgePass;
pub use error_reporting::ErrorReportingPass;
pub use lockset::LocksetPass;
pub use race::RacePass;

use lockwatch_ir::{Attribute, Block, Cmd, Expr, Procedure, Program, SpecClause, Transfer, Variable};

use crate::error::AnalysisError;
use crate::instance::Instance;

/// Attribute of assertions checking for races.
pub const RACE_CHECKING_ATTR: &str = "race_checking";
/// Attribute of assertions checking that locks are released.
pub const DEADLOCK_CHECKING_ATTR: &str = "deadlock_checking";
pub const RESOURCE_ATTR: &str = "resource";
pub const ACCESS_ATTR: &str = "access";
pub const ENTRYPOINT_ATTR: &str = "entrypoint";
pub const CAPTURE_STATE_ATTR: &str = "captureState";

// ---------------------------------------------------------------------------
// Shadow names
// ---------------------------------------------------------------------------

pub fn cls_var(lock: &str, inst: &Instance) -> String {
    format!("CLS_{lock}{}", inst.shadow_suffix())
}

pub fn mls_var(region: &str, lock: &str, inst: &Instance) -> String {
    format!("MLS_{region}_{lock}{}", inst.shadow_suffix())
}

pub fn written_var(region: &str, inst: &Instance) -> String {
    format!("WRITTEN_{region}{}", inst.shadow_suffix())
}

pub fn read_var(region: &str, inst: &Instance) -> String {
    format!("READ_{region}{}", inst.shadow_suffix())
}

pub fn watched_offset(region: &str) -> String {
    format!("WATCHED_ACCESS_OFFSET_{region}")
}

pub fn device_registered_var(inst: &Instance) -> String {
    format!("DEVICE_IS_REGISTERED{}", inst.shadow_suffix())
}

pub fn update_cls_proc(inst: &Instance) -> String {
    format!("_UPDATE_CLS{}", inst.shadow_suffix())
}

pub fn write_ls_proc(region: &str, inst: &Instance) -> String {
    format!("_WRITE_LS_{region}{}", inst.shadow_suffix())
}

pub fn read_ls_proc(region: &str, inst: &Instance) -> String {
    format!("_READ_LS_{region}{}", inst.shadow_suffix())
}

pub fn check_locks_proc(inst: &Instance) -> String {
    format!("_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED{}", inst.shadow_suffix())
}

pub fn register_device_proc(inst: &Instance) -> String {
    format!("_REGISTER_DEVICE{}", inst.shadow_suffix())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// An inlined helper procedure with a single straight-line block.
pub(crate) fn helper_procedure(
    name: String,
    params: Vec<Variable>,
    locals: Vec<Variable>,
    cmds: Vec<Cmd>,
    modifies: impl IntoIterator<Item = String>,
) -> Procedure {
    let mut proc = Procedure::new(name);
    proc.attrs.push(Attribute::expr("inline", Expr::int(1)));
    proc.params = params;
    proc.locals = locals;
    for var in modifies {
        proc.contract.add_modifies(var);
    }
    proc.blocks = vec![Block::new("$entry", cmds, Transfer::Return)];
    proc
}

/// Add a precondition to the root procedure of `inst`.
pub(crate) fn require_on_entry(
    program: &mut Program,
    inst: &Instance,
    expr: Expr,
) -> Result<(), AnalysisError> {
    let root = program
        .procedure_mut(&inst.root)
        .ok_or_else(|| AnalysisError::MissingProcedure(inst.root.clone()))?;
    root.contract.requires.push(SpecClause::new(expr));
    Ok(())
}

/// `var` when `value` holds, `!var` otherwise.
pub(crate) fn literal(var: &str, value: bool) -> Expr {
    if value {
        Expr::ident(var)
    } else {
        Expr::not(Expr::ident(var))
    }
}

/// Replace every command of `proc` for which `rewrite` returns `Some`.
pub(crate) fn rewrite_commands<F>(proc: &mut Procedure, mut rewrite: F) -> Result<(), AnalysisError>
where
    F: FnMut(&str, usize, &Cmd) -> Result<Option<Vec<Cmd>>, AnalysisError>,
{
    for block in &mut proc.blocks {
        let mut out = Vec::with_capacity(block.cmds.len());
        for (idx, cmd) in block.cmds.iter().enumerate() {
            match rewrite(&block.label, idx, cmd)? {
                Some(replacement) => out.extend(replacement),
                None => out.push(cmd.clone()),
            }
        }
        block.cmds = out;
    }
    Ok(())
}
