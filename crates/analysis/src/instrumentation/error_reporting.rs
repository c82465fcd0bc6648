//! Captured-state metadata used to turn a failing trace back into source
//! locations.
//!
//! Every access helper call is preceded by a `captureState` assume carrying
//! the region, access kind, instance, accessed address and the line/column of
//! the `sourceloc` assume that directly precedes the originating command. A failing race
//! check therefore has its own access as the last captured state.

use lockwatch_ir::{AttrValue, Attribute, Attributes, Cmd, Expr, Procedure};

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::instance::Instance;
use crate::pipeline::Pass;

use super::{
    ACCESS_ATTR, CAPTURE_STATE_ATTR, ENTRYPOINT_ATTR, RESOURCE_ATTR, check_locks_proc,
    update_cls_proc,
};

/// Attribute of the front end's source-location assumes.
pub const SOURCELOC_ATTR: &str = "sourceloc";
pub const LINE_ATTR: &str = "line";
pub const COLUMN_ATTR: &str = "column";
pub const SOURCE_FILE_ATTR: &str = "sourcefile";
/// Address passed to the access helper, as written at the access.
pub const ADDRESS_ATTR: &str = "address";
/// Prefix of the captured state of each deadlock check.
pub const CHECK_DEADLOCK_STATE: &str = "check_deadlock_state";

/// File, line and column of a `sourceloc` assume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: i128,
    pub column: i128,
}

impl SourceLocation {
    /// Read `{:sourceloc "file", line, column}` from an assume.
    pub fn from_cmd(cmd: &Cmd) -> Option<Self> {
        let Cmd::Assume { attrs, .. } = cmd else {
            return None;
        };
        let values = &attrs.get(SOURCELOC_ATTR)?.values;
        let file = match values.first()? {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Expr(e) => e.as_ident()?.to_string(),
        };
        let number = |v: Option<&AttrValue>| match v? {
            AttrValue::Expr(e) => e.as_int(),
            AttrValue::Str(s) => s.parse().ok(),
        };
        Some(Self {
            file,
            line: number(values.get(1))?,
            column: number(values.get(2))?,
        })
    }

    fn push_attrs(self, attrs: &mut Attributes) {
        attrs.push(Attribute::expr(LINE_ATTR, Expr::int(self.line)));
        attrs.push(Attribute::expr(COLUMN_ATTR, Expr::int(self.column)));
        attrs.push(Attribute::string(SOURCE_FILE_ATTR, self.file));
    }
}

pub struct ErrorReportingPass;

impl Pass for ErrorReportingPass {
    fn name(&self) -> &'static str {
        "error-reporting"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        ctx.require_instances(self.name())?;
        let mut counters = Counters::default();
        for inst in &ctx.instances {
            for name in &inst.procedures {
                let proc = ctx
                    .program
                    .procedure_mut(name)
                    .ok_or_else(|| AnalysisError::MissingProcedure(name.clone()))?;
                annotate_procedure(proc, inst, &mut counters)?;
            }
            let root = ctx
                .program
                .procedure_mut(&inst.root)
                .ok_or_else(|| AnalysisError::MissingProcedure(inst.root.clone()))?;
            if let Some(entry) = root.blocks.first_mut() {
                entry
                    .cmds
                    .insert(0, capture(format!("{}_header_state", inst.name), Attributes::new()));
            }
        }
        tracing::debug!(
            accesses = counters.access,
            updates = counters.update,
            "Added error reporting metadata"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    access: usize,
    update: usize,
    deadlock: usize,
}

fn capture(name: String, extra: Attributes) -> Cmd {
    let mut attrs = Attributes::new().with(Attribute::string(CAPTURE_STATE_ATTR, name));
    for attr in extra.iter() {
        attrs.push(attr.clone());
    }
    Cmd::assume_with(attrs, Expr::bool(true))
}

fn is_access_call(cmd: &Cmd) -> bool {
    matches!(cmd, Cmd::Call { attrs, .. } if attrs.has(ACCESS_ATTR) && attrs.has(RESOURCE_ATTR))
}

fn annotate_procedure(
    proc: &mut Procedure,
    inst: &Instance,
    counters: &mut Counters,
) -> Result<(), AnalysisError> {
    let update = update_cls_proc(inst);
    let check = check_locks_proc(inst);
    for block in &mut proc.blocks {
        let mut out = Vec::with_capacity(block.cmds.len());
        for (idx, cmd) in block.cmds.iter().enumerate() {
            if cmd.callee() == Some(check.as_str()) {
                let mut extra = Attributes::new().with(Attribute::string(ENTRYPOINT_ATTR, &inst.name));
                if let Some(location) = block.cmds[..idx].iter().rev().find_map(SourceLocation::from_cmd) {
                    location.push_attrs(&mut extra);
                }
                out.push(capture(format!("{CHECK_DEADLOCK_STATE}_{}", counters.deadlock), extra));
                out.push(cmd.clone());
                counters.deadlock += 1;
                continue;
            }
            if is_access_call(cmd) {
                let location = origin_location(&block.cmds, idx).ok_or_else(|| {
                    AnalysisError::MissingSourceLocation {
                        procedure: proc.name.clone(),
                        block: block.label.clone(),
                    }
                })?;
                let attrs = cmd.attrs().cloned().unwrap_or_default();
                let mut extra = Attributes::new();
                for key in [RESOURCE_ATTR, ACCESS_ATTR] {
                    if let Some(attr) = attrs.get(key) {
                        extra.push(attr.clone());
                    }
                }
                extra.push(Attribute::string(ENTRYPOINT_ATTR, &inst.name));
                if let Cmd::Call { args, .. } = cmd
                    && let Some(address) = args.first()
                {
                    extra.push(Attribute::expr(ADDRESS_ATTR, address.clone()));
                }
                location.push_attrs(&mut extra);
                out.push(capture(format!("access_state_{}", counters.access), extra));
                out.push(cmd.clone());
                counters.access += 1;
            } else if cmd.callee() == Some(update.as_str()) {
                out.push(cmd.clone());
                out.push(capture(
                    format!("update_cls_state_{}", counters.update),
                    Attributes::new().with(Attribute::string(ENTRYPOINT_ATTR, &inst.name)),
                ));
                counters.update += 1;
            } else {
                out.push(cmd.clone());
            }
        }
        block.cmds = out;
    }
    Ok(())
}

/// Location of the command an access call at `idx` was generated for.
fn origin_location(cmds: &[Cmd], idx: usize) -> Option<SourceLocation> {
    let mut origin = idx;
    while origin > 0 && is_access_call(&cmds[origin]) {
        origin -= 1;
    }
    if is_access_call(&cmds[origin]) || origin == 0 {
        return None;
    }
    SourceLocation::from_cmd(&cmds[origin - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::test_support::make_instance;
    use lockwatch_ir::{Block, Lhs, Transfer};

    fn sourceloc(line: i128, column: i128) -> Cmd {
        Cmd::assume_with(
            Attributes::new().with(Attribute {
                key: SOURCELOC_ATTR.into(),
                values: vec![
                    AttrValue::Str("drv.c".into()),
                    AttrValue::Expr(Expr::int(line)),
                    AttrValue::Expr(Expr::int(column)),
                ],
            }),
            Expr::bool(true),
        )
    }

    fn access_call(kind: &str) -> Cmd {
        Cmd::Call {
            attrs: Attributes::new()
                .with(Attribute::string(RESOURCE_ATTR, "$M.0"))
                .with(Attribute::string(ACCESS_ATTR, kind)),
            callee: format!("_{}_LS_$M.0_$ep$1", kind.to_uppercase()),
            args: vec![Expr::ident("p")],
            outs: vec![],
        }
    }

    fn make_proc(cmds: Vec<Cmd>) -> Procedure {
        let mut proc = Procedure::new("ep$1");
        proc.blocks = vec![Block::new("bb0", cmds, Transfer::Return)];
        proc
    }

    fn store() -> Cmd {
        Cmd::assign(Lhs::map("$M.0", Expr::ident("p")), Expr::int(1))
    }

    // ====== Source location tests ======

    #[test]
    fn reads_sourceloc_assume() {
        let loc = SourceLocation::from_cmd(&sourceloc(12, 7)).unwrap();
        assert_eq!(loc, SourceLocation { file: "drv.c".into(), line: 12, column: 7 });
        assert!(SourceLocation::from_cmd(&Cmd::assume(Expr::bool(true))).is_none());
    }

    #[test]
    fn origin_skips_sibling_access_calls() {
        let cmds = vec![sourceloc(3, 9), store(), access_call("read"), access_call("write")];
        assert_eq!(origin_location(&cmds, 3).unwrap().line, 3);
    }

    // ====== Annotation tests ======

    #[test]
    fn access_gets_captured_state() {
        let inst = make_instance("ep", 1);
        let mut proc = make_proc(vec![sourceloc(10, 2), store(), access_call("write")]);
        let mut counters = Counters::default();
        annotate_procedure(&mut proc, &inst, &mut counters).unwrap();
        let cmds = &proc.blocks[0].cmds;
        assert_eq!(cmds.len(), 4);
        let Cmd::Assume { attrs, .. } = &cmds[2] else {
            panic!("expected captured state");
        };
        assert!(is_access_call(&cmds[3]));
        assert_eq!(attrs.string_value(CAPTURE_STATE_ATTR), Some("access_state_0"));
        assert_eq!(attrs.string_value(ENTRYPOINT_ATTR), Some("ep$1"));
        assert_eq!(attrs.string_value(ACCESS_ATTR), Some("write"));
        assert_eq!(attrs.int_value(LINE_ATTR), Some(10));
        assert_eq!(attrs.int_value(COLUMN_ATTR), Some(2));
        assert_eq!(attrs.string_value(ADDRESS_ATTR), Some("p"));
    }

    #[test]
    fn missing_sourceloc_is_an_error() {
        let inst = make_instance("ep", 1);
        let mut proc = make_proc(vec![store(), access_call("write")]);
        let err = annotate_procedure(&mut proc, &inst, &mut Counters::default()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MissingSourceLocation {
                procedure: "ep$1".into(),
                block: "bb0".into()
            }
        );
    }

    #[test]
    fn lock_updates_and_checks_are_captured() {
        let inst = make_instance("ep", 1);
        let mut proc = make_proc(vec![
            Cmd::call("_UPDATE_CLS_$ep$1", vec![Expr::ident("lock$0"), Expr::bool(true)]),
            Cmd::call("_CHECK_ALL_LOCKS_HAVE_BEEN_RELEASED_$ep$1", vec![]),
        ]);
        let mut counters = Counters::default();
        annotate_procedure(&mut proc, &inst, &mut counters).unwrap();
        let names: Vec<Option<&str>> = proc.blocks[0]
            .cmds
            .iter()
            .map(|c| c.attrs().and_then(|a| a.string_value(CAPTURE_STATE_ATTR)))
            .collect();
        assert_eq!(
            names,
            vec![None, Some("update_cls_state_0"), Some("check_deadlock_state_0"), None]
        );
        assert_eq!(counters.update, 1);
        assert_eq!(counters.deadlock, 1);
    }
}
